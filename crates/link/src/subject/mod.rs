mod registry;
mod stream;
mod window;

pub use registry::{SubjectInfo, SubjectRegistry};
pub use stream::{SubjectStatus, SubjectStream};
pub use window::{FrameWindow, InsertOutcome, Sample};
