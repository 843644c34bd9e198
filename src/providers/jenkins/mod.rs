mod client;
mod source;

pub use client::JenkinsClient;
