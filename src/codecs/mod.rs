// src/codecs/mod.rs
//
// External command-line codecs. Each adapter builds an argv vector and runs
// the tool through `process::run_tool`.

pub mod ffmpeg;
pub mod pngquant;
pub mod process;
