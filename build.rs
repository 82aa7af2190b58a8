fn main() {
    // The linker runs this binary again as its error handling script, without
    // any CARGO_FEATURE_* variables, so that case is dispatched first
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        linker_hint(&args);
    }

    // Load .env file for portal and alert endpoint configuration
    load_env_config();

    // Host builds (unit and integration tests) link with the system linker
    if std::env::var_os("CARGO_FEATURE_ESP32C3").is_none() {
        return;
    }

    linker_be_nice();
    // make sure linkall.x is the last linker script (otherwise might cause problems with flip-link)
    println!("cargo:rustc-link-arg=-Tlinkall.x");
}

/// Load environment configuration from .env file
/// Environment variables take priority over .env file values
fn load_env_config() {
    use std::env;
    use std::path::Path;

    // Tell cargo to rerun this build script if .env file changes
    println!("cargo:rerun-if-changed=.env");

    // Tell cargo to rerun if environment variables change
    println!("cargo:rerun-if-env-changed=ALERT_URL");
    println!("cargo:rerun-if-env-changed=AP_SSID");
    println!("cargo:rerun-if-env-changed=AP_PASSWORD");

    // Try to load .env file if it exists
    if Path::new(".env").exists() {
        match dotenvy::dotenv() {
            Ok(_) => println!("cargo:warning=Loaded .env file"),
            Err(e) => println!("cargo:warning=Failed to load .env file: {}", e),
        }
    }

    // Empty values fall back to the factory defaults
    let read = |key: &str, default: &str| {
        let value = env::var(key).unwrap_or_default().trim().to_string();
        if value.is_empty() {
            default.to_string()
        } else {
            value
        }
    };

    let alert_url = read("ALERT_URL", "");
    let ap_ssid = read("AP_SSID", "AlertMap_Setup");
    let ap_password = read("AP_PASSWORD", "12345678");

    println!("cargo:rustc-env=ALERT_URL={}", alert_url);
    println!("cargo:rustc-env=AP_SSID={}", ap_ssid);
    println!("cargo:rustc-env=AP_PASSWORD={}", ap_password);

    if alert_url.is_empty() {
        println!("cargo:warning=ALERT_URL is empty - alert polling will never update the map");
    } else {
        println!("cargo:warning=ALERT_URL configured: {}", alert_url);
    }

    // WPA2 needs 8..=63 characters, the soft-AP refuses anything else
    if !(8..=63).contains(&ap_password.len()) {
        println!(
            "cargo:warning=AP_PASSWORD has {} characters - the setup access point will not start",
            ap_password.len()
        );
    }
    println!("cargo:warning=Setup access point: {}", ap_ssid);
}

fn linker_hint(args: &[String]) -> ! {
    let kind = args[1].as_str();
    let what = args.get(2).map(String::as_str).unwrap_or_default();

    match kind {
        "undefined-symbol" => match what {
            "_defmt_timestamp" => {
                eprintln!();
                eprintln!("💡 `defmt` not found - make sure `defmt.x` is added as a linker script and you have included `use defmt_rtt as _;`");
                eprintln!();
            }
            "_stack_start" => {
                eprintln!();
                eprintln!("💡 Is the linker script `linkall.x` missing?");
                eprintln!();
            }
            "esp_wifi_preempt_enable"
            | "esp_wifi_preempt_yield_task"
            | "esp_wifi_preempt_task_create" => {
                eprintln!();
                eprintln!("💡 `esp-wifi` has no scheduler enabled. Make sure you have the `builtin-scheduler` feature enabled, or that you provide an external scheduler.");
                eprintln!();
            }
            _ => (),
        },
        // we don't have anything helpful for "missing-lib" yet
        _ => std::process::exit(1),
    }

    std::process::exit(0);
}

fn linker_be_nice() {
    match std::env::current_exe() {
        Ok(exe) => println!(
            "cargo:rustc-link-arg=--error-handling-script={}",
            exe.display()
        ),
        Err(e) => println!("cargo:warning=No linker error hints: {}", e),
    }
}
