//! # arledger-oauth
//!
//! `OAuth2` for the MYOB `AccountRight` API: the authorization-code grant with
//! a browser consent step, refresh-token exchange, and a token store that
//! keeps the current pair in the settings file.
//!
//! ## Features
//!
//! - **Authorization Code Flow**: random anti-forgery state, bounded wait,
//!   redirect captured on a loopback port or pasted by the operator
//! - **Token exchange**: code and refresh grants, every new pair persisted
//!   before it is returned
//! - **Token store**: `[TOKENS]` section of `settings.toml`, rewritten
//!   atomically
//!
//! ## Quick Start
//!
//! ```ignore
//! use arledger_oauth::{AuthorizationCodeFlow, FileTokenStore, OAuthClient, Provider, TokenExchange};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OAuthClient::new("your_api_key", Provider::myob()?)
//!         .with_client_secret("your_secret")
//!         .with_redirect_uri("http://desktop");
//!
//!     let agent = arledger_oauth::flow::agent_for("http://desktop")?;
//!     let mut flow = AuthorizationCodeFlow::new(client.clone());
//!     let authorization = flow.begin_authorization(agent.as_ref()).await?;
//!
//!     let mut exchange = TokenExchange::new(client, FileTokenStore::new("settings.toml"));
//!     exchange.exchange_code(&authorization).await?;
//!
//!     // Later, when the API reports the access token as invalid:
//!     exchange.refresh_stored().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod flow;
pub mod provider;
pub mod store;
pub mod token;

pub use error::{Error, Result};
pub use flow::{AuthorizationAgent, AuthorizationCodeFlow, OAuthClient, TokenExchange};
pub use provider::Provider;
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use token::{AuthorizationResult, TokenPair};
