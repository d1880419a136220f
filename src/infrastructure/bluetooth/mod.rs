//! Bluetooth Module
//!
//! Talks to a Furby Connect over BLE.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────┐   ┌──────────────────────────────┐
//! │       FurbyService        │   │  ContentTransferController   │
//! │  (one-shot commands,      │   │  (DLC upload, flash and      │
//! │   keep-alive, events)     │   │   activate workflow)         │
//! └─────────────┬─────────────┘   └──────────────┬───────────────┘
//!               │                                │
//!               └───────────────┬────────────────┘
//!                               ▼
//!                     ┌───────────────────┐
//!                     │     Transport     │
//!                     │ - command writes  │
//!                     │ - link control    │
//!                     │ - file data       │
//!                     │ - notifications   │
//!                     └─────────┬─────────┘
//!                               │
//!               ┌───────────────┴───────────────┐
//!               ▼                               ▼
//!        ┌────────────┐                 ┌──────────────┐
//!        │  Protocol  │                 │ Notification │
//!        │ - UUIDs    │                 │ - status     │
//!        │ - encoding │                 │ - events     │
//!        └────────────┘                 └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - UUIDs, opcodes and command encoding
//! - [`notification`] - Classification of inbound frames
//! - [`transport`] - The link abstraction and notification fan-out
//! - [`service`] - High-level device commands
//! - [`transfer`] - DLC content transfer

pub mod notification;
pub mod protocol;
pub mod service;
pub mod transfer;
pub mod transport;

pub use service::FurbyService;
pub use transfer::ContentTransferController;
pub use transport::{NotificationHub, Subscription, Transport};
