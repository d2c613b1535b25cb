pub mod colorization;
pub mod flow;
pub mod identity;
pub mod poller;
pub mod progress;
pub mod transition;
