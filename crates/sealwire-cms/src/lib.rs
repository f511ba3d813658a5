#![forbid(unsafe_code)]
#![doc = "Streaming CMS enveloped, authenticated, and encrypted data."]
//!
//! Producer side: build a [`generate::EnvelopedDataGenerator`] (or its
//! authenticated / encrypted siblings), add one recipient per intended
//! reader, open it over any [`std::io::Write`] sink, and stream content
//! through the returned writer. The content-encryption key is generated
//! internally, protected once per recipient, and zeroed on drop.
//!
//! Consumer side: wrap any [`std::io::Read`] source in a
//! [`parse::EnvelopedDataParser`], pick a recipient record out of the
//! [`store::RecipientInformationStore`], offer the matching credential, and
//! read the recovered content incrementally.

pub mod algid;
pub mod attr;
pub mod content;
pub mod generate;
pub mod info;
pub mod parse;
pub mod recipient;
pub mod registry;
pub mod store;

mod key;
mod version;

pub use algid::AlgorithmIdentifier;
pub use key::ContentEncryptionKey;
pub use sealwire_types::{CmsError, CodecError};
pub use sealwire_types::{ContentAlgId, DigestAlgId, KdfAlgId, MacAlgId, WrapAlgId};
