//! # PartKit Server
//!
//! Resource server contracts and CRUD resource generation.
//!
//! - [`Operation`]: query, mutation or subscription with JSON Schemas and a hookable handler
//! - [`Endpoint`]: named group of operations
//! - [`ResourceServer`]: pushes endpoints into wire [`Adapter`]s when the application starts
//! - [`create_resource`]: collection-backed CRUD endpoint typed from field definitions

pub mod crud;
pub mod endpoint;
pub mod operation;
pub mod schemas;
pub mod server;

pub use crud::{create_resource, resource_part, Resource, ResourceDef, NOT_FOUND};
pub use endpoint::Endpoint;
pub use operation::{
    create_mutation, create_query, create_subscription, EventStream, Operation, OperationError,
    OperationKind, Procedure, Request, Response, SharedSchema, Subscription,
};
pub use server::{resource_server_part, Adapter, ResourceServer, SharedAdapter};
