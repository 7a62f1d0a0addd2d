pub mod audio_source;
pub mod file_writer;
pub mod recorder_delegate;
