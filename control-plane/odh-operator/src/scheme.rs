//! Registry of every API kind the operator addresses.
//!
//! Built once at startup and shared by handle. Typed kinds come from
//! `k8s-openapi` and the local CRDs; OpenShift, OLM and prometheus-operator
//! kinds have no Rust types here and are registered by GVK with their plural.

use std::collections::HashMap;

use k8s_openapi::api::{
    apps::v1::Deployment,
    coordination::v1::Lease,
    core::v1::{ConfigMap, Namespace, Pod, Secret},
    networking::v1::NetworkPolicy,
    rbac::v1::{Role, RoleBinding},
};
use kube::{
    Resource,
    api::{ApiResource, GroupVersionKind},
};

use crate::crd::{DSCInitialization, DataScienceCluster};

/// Static description of a kind without a Rust type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KindRef {
    pub group: &'static str,
    pub version: &'static str,
    pub kind: &'static str,
    pub plural: &'static str,
}

impl KindRef {
    pub const fn new(
        group: &'static str,
        version: &'static str,
        kind: &'static str,
        plural: &'static str,
    ) -> Self {
        Self {
            group,
            version,
            kind,
            plural,
        }
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(self.group, self.version, self.kind)
    }

    pub fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk_with_plural(&self.gvk(), self.plural)
    }
}

pub const ROUTE: KindRef =
    KindRef::new("route.openshift.io", "v1", "Route", "routes");
pub const INGRESS_CONTROLLER: KindRef = KindRef::new(
    "operator.openshift.io",
    "v1",
    "IngressController",
    "ingresscontrollers",
);
pub const AUTHENTICATION: KindRef = KindRef::new(
    "config.openshift.io",
    "v1",
    "Authentication",
    "authentications",
);
pub const OPENSHIFT_INGRESS: KindRef =
    KindRef::new("config.openshift.io", "v1", "Ingress", "ingresses");
pub const PROMETHEUS_RULE: KindRef = KindRef::new(
    "monitoring.coreos.com",
    "v1",
    "PrometheusRule",
    "prometheusrules",
);
pub const SERVICE_MONITOR: KindRef = KindRef::new(
    "monitoring.coreos.com",
    "v1",
    "ServiceMonitor",
    "servicemonitors",
);
pub const SUBSCRIPTION: KindRef = KindRef::new(
    "operators.coreos.com",
    "v1alpha1",
    "Subscription",
    "subscriptions",
);
pub const CATALOG_SOURCE: KindRef = KindRef::new(
    "operators.coreos.com",
    "v1alpha1",
    "CatalogSource",
    "catalogsources",
);
pub const USER_GROUP: KindRef =
    KindRef::new("user.openshift.io", "v1", "Group", "groups");
pub const SELF_SUBJECT_RULES_REVIEW: KindRef = KindRef::new(
    "authorization.k8s.io",
    "v1",
    "SelfSubjectRulesReview",
    "selfsubjectrulesreviews",
);
pub const CONSOLE_LINK: KindRef =
    KindRef::new("console.openshift.io", "v1", "ConsoleLink", "consolelinks");

const UNTYPED_KINDS: &[KindRef] = &[
    ROUTE,
    INGRESS_CONTROLLER,
    AUTHENTICATION,
    OPENSHIFT_INGRESS,
    PROMETHEUS_RULE,
    SERVICE_MONITOR,
    SUBSCRIPTION,
    CATALOG_SOURCE,
    USER_GROUP,
    SELF_SUBJECT_RULES_REVIEW,
    CONSOLE_LINK,
];

/// GVK of a typed resource.
pub fn gvk_of<K: Resource<DynamicType = ()>>() -> GroupVersionKind {
    GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()))
}

#[derive(Debug, Clone, Default)]
pub struct Scheme {
    resources: HashMap<GroupVersionKind, ApiResource>,
}

impl Scheme {
    /// The operator's full kind set.
    pub fn new() -> Self {
        let mut scheme = Self::default();
        scheme
            .add::<Secret>()
            .add::<ConfigMap>()
            .add::<Pod>()
            .add::<Namespace>()
            .add::<Deployment>()
            .add::<NetworkPolicy>()
            .add::<Role>()
            .add::<RoleBinding>()
            .add::<Lease>()
            .add::<DSCInitialization>()
            .add::<DataScienceCluster>();
        for kind in UNTYPED_KINDS {
            scheme.add_kind(*kind);
        }
        scheme
    }

    pub fn add<K: Resource<DynamicType = ()>>(&mut self) -> &mut Self {
        let ar = ApiResource::erase::<K>(&());
        self.resources.insert(gvk_of::<K>(), ar);
        self
    }

    pub fn add_kind(&mut self, kind: KindRef) -> &mut Self {
        self.resources.insert(kind.gvk(), kind.api_resource());
        self
    }

    pub fn recognizes(&self, gvk: &GroupVersionKind) -> bool {
        self.resources.contains_key(gvk)
    }

    pub fn api_resource(&self, gvk: &GroupVersionKind) -> Option<&ApiResource> {
        self.resources.get(gvk)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
