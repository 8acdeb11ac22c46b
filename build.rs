/// Expose the compilation target triple as an environment variable at build time.
///
/// `glfixture version` prints it so CI logs show which build provisioned
/// the instance.
fn main() {
    println!(
        "cargo:rustc-env=TARGET={}",
        std::env::var("TARGET").unwrap()
    );
}
