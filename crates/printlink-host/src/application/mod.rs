//! Application layer use cases for the printer host.
//!
//! # What lives here? (for beginners)
//!
//! The *application* layer sits between the pure domain in `printlink-core`
//! and the OS-facing infrastructure.  Use cases here orchestrate domain types
//! to fulfil one caller goal ("find the Bluetooth printers nearby", "open a
//! session to this one") and depend only on traits, never on a concrete SDK.
//!
//! # Sub-modules
//!
//! - **`provider`**       – The capability-provider seam: scans, byte streams,
//!   paired devices, radio and USB queries.  Vendor SDKs and test doubles
//!   implement these traits.
//!
//! - **`permissions`**    – The Permission Gate.  A pure predicate layer over
//!   OS permission state, consulted before any radio or USB work.
//!
//! - **`discover`**       – The Discovery Coordinator.  Runs one time-bounded,
//!   deduplicated scan per call and enforces single-flight per transport.
//!
//! - **`usb_permission`** – Correlates asynchronous OS USB permission answers
//!   with the connect calls waiting on them.
//!
//! - **`connect`**        – The Connection Session Manager.  Owns the single
//!   process-wide printer session.

pub mod connect;
pub mod discover;
pub mod permissions;
pub mod provider;
pub mod usb_permission;
