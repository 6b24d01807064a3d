pub mod frame_queue;
pub mod hashing;
pub mod pcm;
pub mod wav_format;
