pub mod functions;
pub mod head;
pub mod serve;
pub mod submit;
