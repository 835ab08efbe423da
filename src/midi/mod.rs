pub mod event;
pub mod gate;
pub mod mapper;
pub mod sink;
