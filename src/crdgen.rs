//! Prints the CustomResourceDefinition manifests for installation.

use kube::CustomResourceExt;

use artifact_generator_controller::crd::{ArtifactGenerator, ExternalArtifact};

fn main() {
    let crds = [
        serde_yaml::to_string(&ArtifactGenerator::crd()).expect("ArtifactGenerator CRD serializes"),
        serde_yaml::to_string(&ExternalArtifact::crd()).expect("ExternalArtifact CRD serializes"),
    ];
    print!("{}", crds.join("---\n"));
}
