pub mod framing;
pub mod shutdown;
pub mod tcp;

pub use framing::FrameCodec;
pub use shutdown::ShutdownCoordinator;
pub use tcp::{ServerReport, TcpServer, TcpServerConfig, run_with_shutdown};
