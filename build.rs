use rustc_version::{version_meta, Channel};

fn main() {
    println!("cargo::rustc-check-cfg=cfg(docsrs)");

    // enable docsrs cfg flag in nightly channel builds
    // used to annotate feature gated outputs in the docs
    if version_meta().is_ok_and(|meta| meta.channel == Channel::Nightly) {
        println!("cargo:rustc-cfg=docsrs")
    }
}
