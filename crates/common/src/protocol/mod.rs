// Wire shapes exchanged with the hosted document store.

pub mod remote;
