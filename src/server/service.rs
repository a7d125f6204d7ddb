// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Reflection-free handler dispatch (spec.md §9 Design Notes).
//!
//! The source materialises argument/reply values through runtime type
//! reflection on a registered receiver object. This runtime has no
//! reflection, so each exported method is a `Handler` trait object decoding
//! and encoding through the shared `serde_json::Value` wire representation
//! ([`crate::codec`]) instead.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::{Result, RpcError};

/// One exported method. Implementors receive the decoded argument value and
/// return either a reply value or an error string that becomes the
/// response header's `error` field (spec.md §3).
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, args: Value) -> std::result::Result<Value, String>;
}

/// A registered receiver: a set of methods addressable as `"Service.Method"`.
#[derive(Default)]
pub struct Service {
    methods: DashMap<String, Arc<dyn Handler>>,
}

impl Service {
    fn new() -> Self {
        Self { methods: DashMap::new() }
    }

    pub fn method(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.methods.get(name).map(|e| Arc::clone(&e))
    }
}

/// `service_name -> Service`, insert-or-fail per spec.md §3 ("a duplicate
/// name returns an error"). Since registration here happens one method at a
/// time rather than as a single reflected receiver object, "duplicate name"
/// is interpreted per `(service, method)` pair: a service may grow new
/// methods across several `register` calls, but the same method twice is
/// rejected.
#[derive(Default)]
pub struct ServiceMap {
    services: DashMap<String, Service>,
}

impl ServiceMap {
    pub fn new() -> Self {
        Self { services: DashMap::new() }
    }

    pub fn register(&self, service: &str, method: &str, handler: Arc<dyn Handler>) -> Result<()> {
        let entry = self.services.entry(service.to_string()).or_insert_with(Service::new);
        if entry.methods.contains_key(method) {
            return Err(RpcError::Dispatch(format!(
                "rpc: method {service}.{method} already registered"
            )));
        }
        entry.methods.insert(method.to_string(), handler);
        Ok(())
    }

    /// Splits `"Service.Method"` at the last `.` and looks up the handler,
    /// matching the exact error text spec.md §8 scenario S2 expects.
    pub fn find(&self, service_method: &str) -> Result<Arc<dyn Handler>> {
        let (service, method) = service_method.rsplit_once('.').ok_or_else(|| {
            RpcError::Dispatch(format!(
                "rpc server: service/method request ill-formed: {service_method}"
            ))
        })?;

        let svc = self
            .services
            .get(service)
            .ok_or_else(|| RpcError::Dispatch(format!("can't find service {service}")))?;

        svc.method(method)
            .ok_or_else(|| RpcError::Dispatch(format!("can't find method {method}")))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn call(&self, args: Value) -> std::result::Result<Value, String> {
            Ok(args)
        }
    }

    #[test]
    fn duplicate_method_registration_fails() {
        let map = ServiceMap::new();
        map.register("Echo", "Say", Arc::new(Echo)).expect("first registration");
        let err = map.register("Echo", "Say", Arc::new(Echo)).unwrap_err();
        assert!(matches!(err, RpcError::Dispatch(_)));
    }

    #[test]
    fn unknown_service_reports_its_name() {
        let map = ServiceMap::new();
        let err = map.find("Nope.Do").unwrap_err();
        assert!(err.to_string().contains("can't find service Nope"));
    }

    #[test]
    fn unknown_method_reports_its_name() {
        let map = ServiceMap::new();
        map.register("Echo", "Say", Arc::new(Echo)).expect("register");
        let err = map.find("Echo.Shout").unwrap_err();
        assert!(err.to_string().contains("can't find method Shout"));
    }

    #[tokio::test]
    async fn found_handler_executes() {
        let map = ServiceMap::new();
        map.register("Echo", "Say", Arc::new(Echo)).expect("register");
        let handler = map.find("Echo.Say").expect("find");
        let reply = handler.call(json!("hi")).await.expect("call");
        assert_eq!(reply, json!("hi"));
    }
}
