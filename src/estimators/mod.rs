pub mod cusum;
pub mod hawkes;
pub mod robust;
pub mod rolling;
pub mod tdigest;

pub use cusum::{CusumResult, CusumState};
pub use hawkes::HawkesState;
pub use robust::{mad, median, percentile_rank, robust_z_score};
pub use rolling::RollingStats;
pub use tdigest::SizeDigest;
