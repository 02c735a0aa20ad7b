use std::time::{Duration, Instant};

use adb_toolkit_lib::app::commands::{
    check_tools, get_device_info, install_apk_batch, refresh_devices, select_device,
    set_root_enabled, start_mirror, stop_mirror,
};
use adb_toolkit_lib::app::logging::init_logging;
use adb_toolkit_lib::app::state::AppState;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Args {
    serial: Option<String>,
    json: bool,
    apk_paths: Vec<String>,
    with_mirror: bool,
    with_root: bool,
}

#[derive(Serialize)]
struct SmokeSummary {
    tool: &'static str,
    status: &'static str,
    trace_id: String,
    serial: Option<String>,
    checks: Vec<SmokeCheck>,
}

#[derive(Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: &'static str, // pass|fail|warn|skip
    duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SmokeCheck {
    fn skip(name: &'static str) -> Self {
        Self {
            name,
            status: "skip",
            duration_ms: 0,
            detail: None,
            error_code: None,
            error: None,
        }
    }
}

fn parse_args() -> Result<Args, String> {
    let mut serial = std::env::var("ANDROID_SERIAL")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let mut json = false;
    let mut apk_paths = Vec::new();
    let mut with_mirror = false;
    let mut with_root = false;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--serial" => {
                serial = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                if serial.is_none() {
                    return Err("--serial requires a value".to_string());
                }
            }
            "--json" => {
                json = true;
            }
            "--apk" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--apk requires a value".to_string())?;
                apk_paths.push(value);
            }
            "--with-mirror" => {
                with_mirror = true;
            }
            "--with-root" => {
                with_root = true;
            }
            "-h" | "--help" => {
                return Err(
                    "Usage: cargo run --bin smoke -- [--serial SERIAL] [--json] [--apk PATH]... [--with-root] [--with-mirror]\n"
                        .to_string(),
                );
            }
            other => return Err(format!("Unknown arg: {other}")),
        }
    }

    Ok(Args {
        serial,
        json,
        apk_paths,
        with_mirror,
        with_root,
    })
}

/// Runs one check. `Ok(Some(_))` carries a detail line; a warning-level
/// failure is reported by returning `Err` with a `WARN_` code.
fn run_check<F>(checks: &mut Vec<SmokeCheck>, name: &'static str, f: F) -> Result<(), ()>
where
    F: FnOnce() -> Result<Option<String>, (String, String)>,
{
    let start = Instant::now();
    match f() {
        Ok(detail) => {
            checks.push(SmokeCheck {
                name,
                status: "pass",
                duration_ms: start.elapsed().as_millis(),
                detail,
                error_code: None,
                error: None,
            });
            Ok(())
        }
        Err((code, err)) => {
            let warn = code.starts_with("WARN");
            checks.push(SmokeCheck {
                name,
                status: if warn { "warn" } else { "fail" },
                duration_ms: start.elapsed().as_millis(),
                detail: None,
                error_code: Some(code),
                error: Some(err),
            });
            if warn {
                Ok(())
            } else {
                Err(())
            }
        }
    }
}

fn finish(summary: SmokeSummary, json: bool) -> ! {
    let output = if json {
        serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string())
    } else {
        let mut text = format!("status: {}\ntrace_id: {}\n", summary.status, summary.trace_id);
        for check in &summary.checks {
            text.push_str(&format!("  {:<14} {}", check.name, check.status));
            if let Some(error) = &check.error {
                text.push_str(&format!(" ({error})"));
            } else if let Some(detail) = &check.detail {
                text.push_str(&format!(" ({detail})"));
            }
            text.push('\n');
        }
        text
    };
    println!("{output}");
    std::process::exit(if summary.status == "pass" { 0 } else { 1 });
}

fn main() {
    let args = match parse_args() {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let trace_id = Uuid::new_v4().to_string();
    let mut checks: Vec<SmokeCheck> = Vec::new();
    let mut status = "pass";

    let state = match AppState::load(&trace_id) {
        Ok(state) => state,
        Err(err) => {
            checks.push(SmokeCheck {
                name: "load_config",
                status: "fail",
                duration_ms: 0,
                detail: None,
                error_code: Some(err.code.clone()),
                error: Some(err.to_string()),
            });
            finish(
                SmokeSummary {
                    tool: "adb_toolkit_smoke",
                    status: "fail",
                    trace_id,
                    serial: args.serial,
                    checks,
                },
                args.json,
            );
        }
    };
    if let Ok(config) = state.config(&trace_id) {
        init_logging(&config.logging.log_level);
    }

    if run_check(&mut checks, "check_tools", || {
        let tools = check_tools(&state, None, Some(trace_id.clone()))
            .map_err(|err| (err.code.clone(), err.to_string()))?
            .data;
        let adb = tools
            .iter()
            .find(|tool| tool.name == "adb")
            .ok_or_else(|| ("ERR_CHECK_TOOLS".to_string(), "adb missing from report".to_string()))?;
        if !adb.available {
            return Err((
                "ERR_DEPENDENCY".to_string(),
                adb.error.clone().unwrap_or_else(|| "adb unavailable".to_string()),
            ));
        }
        let summary = tools
            .iter()
            .map(|tool| format!("{}={}", tool.name, if tool.available { "ok" } else { "missing" }))
            .collect::<Vec<_>>()
            .join(" ");
        Ok(Some(summary))
    })
    .is_err()
    {
        status = "fail";
    }

    let mut serial = args.serial.clone();
    if run_check(&mut checks, "roster", || {
        let update = refresh_devices(&state, Some(trace_id.clone()))
            .map_err(|err| (err.code.clone(), err.to_string()))?
            .data;
        let online: Vec<String> = update
            .devices
            .iter()
            .filter(|device| device.is_online())
            .map(|device| device.serial.clone())
            .collect();
        if serial.is_none() {
            serial = match online.as_slice() {
                [] => {
                    return Err(("ERR_NO_DEVICE".to_string(), "No online adb devices found.".to_string()))
                }
                [only] => Some(only.clone()),
                many => {
                    return Err((
                        "ERR_MULTIPLE_DEVICES".to_string(),
                        format!(
                            "Multiple online devices found ({}). Set ANDROID_SERIAL or pass --serial.",
                            many.join(", ")
                        ),
                    ))
                }
            };
        }
        Ok(Some(format!("{} online", online.len())))
    })
    .is_err()
    {
        status = "fail";
    }

    let Some(serial) = serial else {
        finish(
            SmokeSummary {
                tool: "adb_toolkit_smoke",
                status: "fail",
                trace_id,
                serial: None,
                checks,
            },
            args.json,
        );
    };

    let mut root_available = false;
    if run_check(&mut checks, "select_device", || {
        let selection = select_device(&state, serial.clone(), Some(trace_id.clone()))
            .map_err(|err| (err.code.clone(), err.to_string()))?
            .data;
        root_available = selection.root.available;
        Ok(Some(format!("root_available={}", selection.root.available)))
    })
    .is_err()
    {
        status = "fail";
    }

    if run_check(&mut checks, "device_info", || {
        let info = get_device_info(&state, Some(serial.clone()), Some(trace_id.clone()))
            .map_err(|err| (err.code.clone(), err.to_string()))?
            .data;
        Ok(Some(format!(
            "model={} android={} battery={}",
            info.model.as_deref().unwrap_or("?"),
            info.android_version.as_deref().unwrap_or("?"),
            info.battery.as_deref().unwrap_or("?")
        )))
    })
    .is_err()
    {
        status = "fail";
    }

    if args.with_root && root_available {
        let _ = run_check(&mut checks, "enable_root", || {
            let capability = set_root_enabled(&state, Some(serial.clone()), true, Some(trace_id.clone()))
                .map_err(|err| ("WARN_ROOT".to_string(), err.to_string()))?
                .data;
            Ok(Some(format!("enabled={}", capability.enabled)))
        });
    } else {
        checks.push(SmokeCheck::skip("enable_root"));
    }

    if args.apk_paths.is_empty() {
        checks.push(SmokeCheck::skip("apk_install"));
    } else if run_check(&mut checks, "apk_install", || {
        let summary = install_apk_batch(
            &state,
            Some(serial.clone()),
            args.apk_paths.clone(),
            |progress| eprintln!("[{}/{}] {}", progress.completed, progress.total, progress.current),
            Some(trace_id.clone()),
        )
        .map_err(|err| (err.code.clone(), err.to_string()))?
        .data;
        if summary.success_count != summary.total {
            let failures = summary
                .results
                .iter()
                .filter(|result| !result.success)
                .map(|result| format!("{}: {}", result.identifier, result.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(("ERR_INSTALL".to_string(), failures));
        }
        Ok(Some(summary.summary_line()))
    })
    .is_err()
    {
        status = "fail";
    }

    if args.with_mirror {
        if run_check(&mut checks, "mirror", || {
            let started = start_mirror(&state, Some(serial.clone()), None, Some(trace_id.clone()))
                .map_err(|err| (err.code.clone(), err.to_string()))?
                .data;
            std::thread::sleep(Duration::from_secs(2));
            let stopped = stop_mirror(&state, Some(trace_id.clone()))
                .map_err(|err| (err.code.clone(), err.to_string()))?
                .data;
            Ok(Some(format!(
                "pid={} stopped={}",
                started.pid.map(|pid| pid.to_string()).unwrap_or_default(),
                !stopped.is_running()
            )))
        })
        .is_err()
        {
            status = "fail";
        }
    } else {
        checks.push(SmokeCheck::skip("mirror"));
    }

    finish(
        SmokeSummary {
            tool: "adb_toolkit_smoke",
            status,
            trace_id,
            serial: Some(serial),
            checks,
        },
        args.json,
    );
}
