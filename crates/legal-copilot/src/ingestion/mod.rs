//! Document ingestion: segmentation of extracted text into addressable passages

mod segmenter;

pub use segmenter::Segmenter;
