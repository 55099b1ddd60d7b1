use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // UTC build timestamp; falls back to unix seconds if formatting fails.
    let now = OffsetDateTime::now_utc().replace_nanosecond(0).unwrap_or(OffsetDateTime::now_utc());
    let build_date = now
        .format(&Rfc3339)
        .unwrap_or_else(|_| format!("unix:{}", now.unix_timestamp()));
    println!("cargo:rustc-env=ECUI_BUILD_DATE={build_date}");

    let target = std::env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=ECUI_BUILD_TARGET={target}");

    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=ECUI_BUILD_PROFILE={profile}");

    let rustc = rustc_version::version_meta()
        .map(|m| m.short_version_string)
        .unwrap_or_else(|_| "rustc unknown".to_string());
    println!("cargo:rustc-env=ECUI_BUILD_RUSTC={rustc}");
}
