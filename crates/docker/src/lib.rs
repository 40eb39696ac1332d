#![deny(unused)]
//! Docker implementation of the engine gateway, built on `bollard`.

pub mod gateway;

pub use gateway::DockerGateway;
