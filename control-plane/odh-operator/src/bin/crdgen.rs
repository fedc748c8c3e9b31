use kube::core::CustomResourceExt;
use odh_operator::crd::{DSCInitialization, DataScienceCluster};

fn main() {
    for crd in [DSCInitialization::crd(), DataScienceCluster::crd()] {
        let yaml = serde_yaml::to_string(&crd).expect("serialize CRD to YAML");
        println!("---\n{}", yaml);
    }
}
