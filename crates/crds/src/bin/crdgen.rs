//! Prints the CustomResourceDefinitions served by the operator as a YAML stream.
//!
//! Usage: `cargo run -p crds --bin crdgen > deploy/crds.yaml`

use anyhow::Result;
use crds::function_ingress::{v1, v1alpha2};
use crds::Function;
use kube::core::crd::merge_crds;
use kube::CustomResourceExt;

fn main() -> Result<()> {
    // v1 is the storage version; v1alpha2 is still served
    let function_ingress = merge_crds(
        vec![v1::FunctionIngress::crd(), v1alpha2::FunctionIngress::crd()],
        "v1",
    )?;

    print!("{}", serde_yaml::to_string(&function_ingress)?);
    println!("---");
    print!("{}", serde_yaml::to_string(&Function::crd())?);
    Ok(())
}
