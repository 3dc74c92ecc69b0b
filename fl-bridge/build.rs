//! Refuse to build unless exactly one driver feature is enabled.

/// Every driver feature and what it drives.
const DRIVERS: &[(&str, &str)] = &[
    ("driver-debug", "a fake device that logs every command"),
    ("driver-openrgb", "every device behind an OpenRGB SDK server"),
];

/// The environment variable that cargo sets for an enabled feature.
fn feature_env_var(feature: &str) -> String {
    format!("CARGO_FEATURE_{}", feature.to_uppercase().replace('-', "_"))
}

fn main() -> Result<(), String> {
    let enabled: Vec<&str> = DRIVERS
        .iter()
        .map(|&(feature, _)| feature)
        .filter(|feature| std::env::var_os(feature_env_var(feature)).is_some())
        .collect();

    if let [_] = enabled[..] {
        return Ok(());
    }

    let options: Vec<String> = DRIVERS
        .iter()
        .map(|(feature, about)| format!("`{feature}` for {about}"))
        .collect();
    Err(format!(
        "fl-bridge needs exactly one driver feature, but got [{}]. Pick one of: {}",
        enabled.join(", "),
        options.join("; ")
    ))
}
