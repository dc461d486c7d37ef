// Argus server library - HTTP front-end for the live detection loop

pub mod http;
pub mod page;
