pub mod client;
pub mod config;
pub mod descriptor;
pub mod dispatcher;
pub mod errors;
pub mod queue;
pub mod region;
pub mod retry;
pub mod transport;

mod test_utils;

pub use client::HttpClient;
pub use client::HttpClientConfig;
pub use config::DispatcherConfig;
pub use descriptor::RequestDescriptor;
pub use dispatcher::Dispatcher;
pub use dispatcher::DispatcherBuilder;
pub use errors::DispatchError;
pub use errors::ErrorKind;
pub use errors::Result;
pub use region::RegionRouter;
pub use retry::RetryPolicy;
pub use transport::ApiRequest;
pub use transport::ApiResponse;
pub use transport::Transport;
pub use transport::TransportError;
