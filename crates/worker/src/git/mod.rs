// Git subprocess layer: a streaming command executor and the worker that
// drives `git` through it.

pub mod executor;
pub mod worker;
