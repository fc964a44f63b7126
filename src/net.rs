//! Network side of the fetcher: requests, transports, bodies and the
//! redirect-following loader itself.
mod fetch;
mod query;
mod request;
mod response;
mod transport;

pub use fetch::{DataCallback, DataSource, HttpUrlFetcher, RedirectState};
pub use query::{parse_query_map, QueryFlags, SECRET_KEY, TARGET_KEY};
pub use request::FetchRequest;
pub use response::{BodyStream, BoxStream, ResponseBody};
pub use transport::{ConnectRequest, Connection, HttpTransport, Transport};
