// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ID newtypes and generation

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `Display`, `From<String>`, `From<&str>`,
/// `PartialEq<str>`, `PartialEq<&str>`, and `Borrow<str>` implementations.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

crate::define_id! {
    /// Catalog/installed app identifier (slug, unique in the merged catalog).
    #[derive(Default)]
    pub struct AppId;
}

crate::define_id! {
    /// Transaction identifier in the durable transaction index.
    pub struct TxId;
}

crate::define_id! {
    /// Firewall plan identifier.
    pub struct PlanId;
}

crate::define_id! {
    /// Snapshot identifier (timestamp-derived slug, unique within a target).
    pub struct SnapshotId;
}

crate::define_id! {
    /// Request identifier carried on every agent call for idempotence
    /// and log correlation.
    pub struct RequestId;
}

crate::define_id! {
    /// Handle for a long-running HTTP operation (202 responses).
    pub struct JobId;
}

crate::define_id! {
    /// Identifier for a scheduled timer.
    pub struct TimerId;
}

impl TimerId {
    /// Timer for the firewall confirm deadline of a pending apply.
    pub fn firewall_confirm(plan_id: &PlanId) -> Self {
        Self::new(format!("firewall-confirm:{}", plan_id))
    }

    /// Timer for the periodic catalog refresh tick.
    pub fn catalog_refresh() -> Self {
        Self::new("catalog-refresh")
    }

    /// Timer for the periodic snapshot retention prune.
    pub fn retention_prune() -> Self {
        Self::new("retention-prune")
    }

    /// Returns the plan id if this is a firewall confirm timer.
    pub fn firewall_plan_id(&self) -> Option<PlanId> {
        self.0
            .strip_prefix("firewall-confirm:")
            .map(PlanId::new)
    }
}

/// Generates unique identifiers
pub trait IdGen: Clone + Send + Sync {
    fn next(&self) -> String;
}

/// UUID-based ID generator for production use
#[derive(Clone, Default)]
pub struct UuidIdGen;

impl IdGen for UuidIdGen {
    fn next(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Sequential ID generator for testing
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone)]
pub struct SequentialIdGen {
    prefix: String,
    counter: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

#[cfg(any(test, feature = "test-support"))]
impl SequentialIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: std::sync::Arc::new(std::sync::atomic::AtomicU64::new(1)),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl IdGen for SequentialIdGen {
    fn next(&self) -> String {
        let n = self
            .counter
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
