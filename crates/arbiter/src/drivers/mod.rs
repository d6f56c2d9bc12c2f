//! Backend drivers
//!
//! One module per storage type. `fs` is the only driver that touches the
//! disk directly; everything else goes through the transport pool, with
//! the cloud drivers adding their provider's request signing on top of
//! the generic [`http`] driver.

pub mod az;
pub mod fs;
pub mod gs;
pub mod http;
pub mod od;
pub mod s3;

pub use az::Az;
pub use fs::Fs;
pub use gs::Gs;
pub use http::Http;
pub use od::Od;
pub use s3::S3;
