//! The scheduler: task registry, dispatch loop and execution.

mod control;
mod core;
mod dispatch;
mod due;
mod execution;
mod lifecycle;
mod queries;


pub use self::core::Scheduler;
