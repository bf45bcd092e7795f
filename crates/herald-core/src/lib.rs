//! # Herald Core
//!
//! Foundation types for the Herald command dispatch framework.
//!
//! This crate holds what every other layer agrees on:
//! - **Messages**: the [`InboundMessage`] model handed to the dispatcher
//! - **Bot**: the [`Bot`] collaborator used to answer messages
//! - **Embeds**: rich reply payloads ([`Embed`])
//! - **Errors**: [`DeliveryError`] and the [`BoxError`] alias
//!
//! ```text
//! ┌─────────────┐     ┌────────────┐     ┌───────────┐
//! │   Gateway   │────▶│ Dispatcher │────▶│  Command  │
//! │  (adapter)  │     │ (framework)│     │  handler  │
//! └─────────────┘     └────────────┘     └───────────┘
//!        ▲                                     │
//!        └──────────────── Bot ◀───────────────┘
//! ```

pub mod bot;
pub mod embed;
pub mod error;
pub mod message;

pub use bot::{Bot, BoxedBot, downcast_bot, mention, nickname_mention};
pub use embed::{ERROR_COLOR, Embed};
pub use error::{BoxError, DeliveryError, DeliveryResult};
pub use message::{Author, InboundMessage, MessageKind};
