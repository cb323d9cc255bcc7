//! 回合层：状态机、控制器与过程事件

pub mod events;
pub mod loop_;

pub use events::TurnEvent;
pub use loop_::{TurnController, TurnPhase};
