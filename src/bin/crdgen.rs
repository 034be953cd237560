//! # CRD Generator
//!
//! Prints the `UnifiedNetworkPolicy` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/unifiednetworkpolicy.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;
use stargazer::crd::UnifiedNetworkPolicy;

fn main() {
    let crd = UnifiedNetworkPolicy::crd();

    match serde_yaml::to_string(&crd) {
        Ok(yaml) => {
            println!("# This file is auto-generated by crdgen");
            println!("# DO NOT EDIT THIS FILE MANUALLY");
            println!("---");
            print!("{yaml}");
        }
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
