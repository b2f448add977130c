//! Prints the Route CRD manifest as YAML.
//!
//! Only needed on plain Kubernetes clusters where the OpenShift route API
//! is not already served.

use kube::CustomResourceExt;

fn main() {
    match serde_yaml::to_string(&crds::Route::crd()) {
        Ok(yaml) => print!("{yaml}"),
        Err(e) => {
            eprintln!("failed to render Route CRD: {e}");
            std::process::exit(1);
        }
    }
}
