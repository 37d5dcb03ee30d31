mod reader;

// Re-export from reader
pub use reader::{is_safetensors_file, read_header_len, SafetensorsReader, MAX_HEADER_LEN};
