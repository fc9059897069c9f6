mod backend;

pub use backend::MultipartBackend;
