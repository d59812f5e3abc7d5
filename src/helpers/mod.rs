//! Package and markup plumbing shared by the document backends.
pub(crate) mod xml;
pub(crate) mod zip;
