#![allow(async_fn_in_trait)]

//! # firestash
//!
//! `firestash` is a typed object-document mapper for hierarchical document
//! databases, where documents live in collections, and collections can hang
//! under documents (`users/ann/posts/hello`).
//!
//! It is built around three ideas:
//!
//! * A model family is addressed by a mustache path [`Template`](address::Template),
//!   like `users/{userId}/posts`. A [`Location`](location::Location) fills the
//!   placeholders (and optionally the document id), and concrete paths can be
//!   parsed back into locations.
//! * Models are plain serde records. Identity and timestamps live in the
//!   [`Document`](model::Document) envelope around them, never in the record
//!   itself. Writes refuse fields the model doesn't declare; reads drop them
//!   and report them once through a [`MissingFieldNotifier`](model::MissingFieldNotifier).
//! * A model can be *flattened* over several documents: fields tagged in its
//!   [`Schema`](model::Schema) are stored in sub-documents under the base
//!   document, and merged back on read by a [`FlattableDao`](dao::FlattableDao).
//!   That's how you keep, e.g., the salary of an employee in a document with
//!   stricter access rules than the rest of the profile.
//!
//! # Quick example
//!
#![cfg_attr(not(feature = "memory"), doc = "```ignore")]
#![cfg_attr(feature = "memory", doc = "```")]
//! use firestash::dao::{Dao, SaveOptions};
//! use firestash::location::Location;
//! use firestash::model::{Model, Schema};
//! use firestash::stores::memory::MemoryStore;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
//! struct Member {
//!     name: String,
//!     role: String,
//! }
//!
//! impl Model for Member {
//!     const NAME: &'static str = "Member";
//! }
//!
//! # tokio_test::block_on(async {
//! let dao = Dao::<Member, _>::new(MemoryStore::new(), "orgs/{orgId}/members")?;
//! let acme = Location::new().at("orgId", "acme");
//!
//! let ann = Member { name: "Ann".to_owned(), role: "admin".to_owned() };
//! let created = dao.create(&ann, Some(acme.into()), SaveOptions::default()).await?;
//!
//! // the envelope knows where the record lives
//! assert_eq!(created.collection_path(), "orgs/acme/members");
//! assert_eq!(dao.get(&created).await?.map(|m| m.into_data()), Some(ann));
//!
//! Ok::<(), firestash::dao::DaoError<_>>(())
//! # }).unwrap()
//! ```
//!
//! # Stores
//!
//! DAOs talk to the database through [`DocumentStore`](store::DocumentStore)
//! (and [`BlobStore`](store::BlobStore) for file fields). The crate comes with:
//!
//! - [`stores::memory::MemoryStore`] (feature `memory`, on by default)
//!
//! Wrappers:
//! - [`wrappers::guard::GuardedStore`], refusing access to some paths
//!
//! The library never installs a `tracing` subscriber; bring your own.
pub mod store;

pub mod address;
pub mod dao;
pub mod location;
pub mod model;
pub mod stores;
pub mod wrappers;
