mod google;
mod tika;

pub use google::GoogleBooks;
pub use tika::TikaExtractor;
