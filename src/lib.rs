//! A high-volume async HTTP/1.1 client.
//!
//! `stampede` is built for issuing very large numbers of requests against a
//! small set of origin hosts. Every origin gets a fixed-capacity connection
//! pool that maximizes keep-alive reuse, name lookups go through a caching
//! DNS resolver with per-record TTLs, and responses are buffered in full and
//! exposed with case-insensitive header access, transparent gzip/deflate
//! decoding, and JSON parsing.
//!
//! The client is single-threaded and cooperative: run one per worker on a
//! current-thread runtime and share nothing between workers.
//!
//! ```no_run
//! use stampede::Client;
//!
//! #[actix_rt::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(10);
//!
//!     let res = client
//!         .get("http://127.0.0.1:8080/index.html")
//!         .header("Accept-Encoding", "gzip")
//!         .send()
//!         .await?;
//!
//!     println!("status: {}", res.status());
//!     println!("body: {}", res.text()?);
//!     println!("connects so far: {}", client.connections());
//!     Ok(())
//! }
//! ```

mod builder;
mod client;
pub mod error;
mod h1;
mod header;
mod request;
mod resolver;
mod response;
mod tls;

pub use self::builder::ClientBuilder;
pub use self::client::{Acquired, Client, Connection, Pool};
pub use self::header::HeaderMap;
pub use self::request::ClientRequest;
pub use self::resolver::{is_ip, Record, Resolver};
pub use self::response::ClientResponse;

pub use http::{Method, StatusCode, Uri};
