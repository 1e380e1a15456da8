//! OpenFaaS CRD Definitions
//!
//! Kubernetes Custom Resource Definitions consumed by the ingress operator.

pub mod function;
pub mod function_ingress;
pub mod references;

pub use function::*;
pub use function_ingress::v1::*;
pub use function_ingress::{GROUP, KIND as FUNCTION_INGRESS_KIND};
pub use references::*;
