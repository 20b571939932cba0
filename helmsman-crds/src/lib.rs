use thiserror::Error;

pub mod v1;

use kube::CustomResourceExt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("yaml error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

pub fn crd_gen_cluster() -> Result<()> {
    print!("---\n{}", serde_yaml::to_string(&v1::cluster::Cluster::crd())?);
    Ok(())
}

pub fn crd_gen_listener() -> Result<()> {
    print!(
        "---\n{}",
        serde_yaml::to_string(&v1::listener::Listener::crd())?
    );
    Ok(())
}

pub fn crd_gen_route() -> Result<()> {
    print!("---\n{}", serde_yaml::to_string(&v1::route::Route::crd())?);
    Ok(())
}

pub fn crd_gen_all() -> Result<()> {
    let crds = vec![
        v1::cluster::Cluster::crd(),
        v1::listener::Listener::crd(),
        v1::route::Route::crd(),
    ];
    for crd in crds {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
