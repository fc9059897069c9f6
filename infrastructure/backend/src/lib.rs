mod local;

pub use local::LocalMultipartBackend;
