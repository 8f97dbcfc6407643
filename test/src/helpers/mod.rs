mod recording_callbacks;
mod test_cluster;

pub use recording_callbacks::{Recorded, RecordingCallbacks};
pub use test_cluster::{TestCluster, TestWorker};
