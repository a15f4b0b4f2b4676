use partkit::Registry;

use crate::operation::Operation;

/// Named, ordered group of operations. Adapters expose each endpoint under
/// its name and resolve operations on every call, so operations added after
/// the endpoint reached an adapter are still served.
#[derive(Debug)]
pub struct Endpoint {
    name: String,
    operations: Registry<Operation>,
}

impl Endpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: Registry::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append an operation and hand it back for hook registration.
    pub fn add(&self, operation: Operation) -> Operation {
        tracing::debug!(
            endpoint = %self.name,
            operation = %operation.name(),
            kind = operation.kind().as_str(),
            "registering operation"
        );
        self.operations.register(operation.clone());
        operation
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.operations.snapshot()
    }

    /// First operation registered under `name`.
    pub fn operation(&self, name: &str) -> Option<Operation> {
        self.operations
            .snapshot()
            .into_iter()
            .find(|op| op.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{create_mutation, create_query, OperationKind, Response};
    use serde_json::json;

    #[test]
    fn operations_keep_registration_order() {
        let endpoint = Endpoint::new("people");
        endpoint.add(create_query("find", json!({}), json!({}), |_| async {
            Ok(Response::ok(json!([])))
        }));
        endpoint.add(create_mutation("create", json!({}), json!({}), |_| async {
            Ok(Response::ok(json!({})))
        }));

        let names: Vec<String> = endpoint.operations().iter().map(|o| o.name().to_string()).collect();
        assert_eq!(names, vec!["find", "create"]);
        assert_eq!(
            endpoint.operation("create").map(|o| o.kind()),
            Some(OperationKind::Mutation)
        );
        assert!(endpoint.operation("missing").is_none());
    }
}
