//! Session-independent building blocks: the transfer events, the document store, and the
//! pure transformations the session controller sequences.

pub mod details;
pub mod disclosure;
pub mod document;
pub mod event;
pub mod outcome;
pub mod selection;
