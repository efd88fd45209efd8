pub mod backend;
pub mod capture;
pub mod convert;
pub mod device;
pub mod file;

pub use backend::{
    enumerate_devices, AudioBackend, AudioBackendFactory, AudioFrame, DeviceInfo, DeviceKind,
    PerStream, RawAudioFrame, SampleData, SourceSpec, StreamSource,
};
pub use capture::{AudioSourceCapture, FrameQueue, DEFAULT_QUEUE_DEPTH};
pub use file::WavFileBackend;
