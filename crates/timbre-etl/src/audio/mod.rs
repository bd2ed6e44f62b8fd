pub mod decoder;

pub use decoder::{decode_audio, load_sample, DecodedAudio};
