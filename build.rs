// build.rs

fn main() {
    // --- Link against X11 and its extensions ---
    // Try pkg-config first, which is the standard way to find library linking
    // information on Unix-like systems. If pkg-config fails (not installed, or
    // the .pc file is missing), fall back to manually specifying common
    // linker flags.

    let libraries = ["x11", "xinerama"]; // Libraries needed for the X backend

    let mut pkg_config_success = true;

    for lib in &libraries {
        let result = pkg_config::probe_library(lib);

        if result.is_err() {
            // If probing fails for any library, assume pkg-config isn't fully
            // working on this system and switch to manual linking.
            eprintln!(
                "pkg-config failed for library '{}'. Falling back to manual linking.",
                lib
            );
            pkg_config_success = false;
            break;
        }
    }

    if !pkg_config_success {
        // --- Manual Linking Fallback ---
        // This assumes libraries are in standard paths like /usr/lib or
        // /usr/local/lib. Adjust the -L path or LIBRARY_PATH for non-standard
        // installations.
        println!("cargo:rustc-link-lib=X11");
        println!("cargo:rustc-link-lib=Xext"); // Often needed with X11
        println!("cargo:rustc-link-lib=Xinerama"); // Multi-output queries

        println!("cargo:rustc-link-search=/usr/lib");

        eprintln!(
            "Manual linking flags applied. Ensure X11 and Xinerama development libraries are installed."
        );
    } else {
        eprintln!("pkg-config successfully found libraries. Linking configured automatically.");
    }
}
