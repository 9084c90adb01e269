//! Entry point for the streamtop TUI. Parses args, resolves the endpoint
//! and operator identity, and runs the App.

use std::env;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use streamtop::app::App;
use streamtop::client::{ClientConfig, StaleBy, SweepConfig};
use streamtop::endpoints::{
    load_endpoints, metrics_url, save_endpoints, EndpointEntry, EndpointRequest, ResolveEndpoint,
};
use streamtop::retry::wait_for;
use streamtop::session::{identity_path, LoginSession, SESSION};
use streamtop::signer::{KeySigner, Signer};

struct ParsedArgs {
    url: Option<String>,
    tls_ca: Option<String>,
    endpoint: Option<String>,
    save: bool,
    demo: bool,
    login: bool,
    logout: bool,
    sweep: SweepConfig,
}

fn usage(prog: &str) -> String {
    format!(
        "Usage: {prog} [--endpoint NAME|-e NAME] [--tls-ca CERT_PEM|-t CERT_PEM] [--save] [--demo] \
         [--login] [--logout] [--stale-after SECS] [--sweep-every SECS] [--stale-by segment|received] \
         [wss://HOST/api/v1/ws | https://HOST]"
    )
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "streamtop".into());
    let mut url: Option<String> = None;
    let mut tls_ca: Option<String> = None;
    let mut endpoint: Option<String> = None;
    let mut save = false;
    let mut demo = false;
    let mut login = false;
    let mut logout = false;
    let mut sweep = SweepConfig::default();

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                return Err(usage(&prog));
            }
            "--tls-ca" | "-t" => {
                tls_ca = it.next();
            }
            "--endpoint" | "-e" => {
                endpoint = it.next();
            }
            "--save" => {
                save = true;
            }
            "--demo" => {
                demo = true;
            }
            "--login" => {
                login = true;
            }
            "--logout" => {
                logout = true;
            }
            "--stale-after" => {
                let secs = it
                    .next()
                    .and_then(|v| v.parse::<u64>().ok())
                    .ok_or_else(|| usage(&prog))?;
                sweep.max_age = Duration::from_secs(secs);
            }
            "--sweep-every" => {
                let secs = it
                    .next()
                    .and_then(|v| v.parse::<u64>().ok())
                    .ok_or_else(|| usage(&prog))?;
                sweep.every = Duration::from_secs(secs);
            }
            "--stale-by" => match it.next().as_deref() {
                Some("segment") => sweep.stale_by = StaleBy::Segment,
                Some("received") => sweep.stale_by = StaleBy::Received,
                _ => return Err(usage(&prog)),
            },
            _ if arg.starts_with("--tls-ca=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        tls_ca = Some(v.to_string());
                    }
                }
            }
            _ if arg.starts_with("--endpoint=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        endpoint = Some(v.to_string());
                    }
                }
            }
            _ => {
                if url.is_none() {
                    url = Some(arg);
                } else {
                    return Err(format!("Unexpected argument. {}", usage(&prog)));
                }
            }
        }
    }
    Ok(ParsedArgs {
        url,
        tls_ca,
        endpoint,
        save,
        demo,
        login,
        logout,
        sweep,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    if parsed.logout {
        SESSION.logout();
        eprintln!("session cleared");
        return Ok(());
    }
    if parsed.login {
        let signer = KeySigner::load_or_generate(&identity_path())?;
        SESSION.login(LoginSession {
            pubkey: signer.public_key(),
            created: Utc::now().timestamp(),
        });
        eprintln!("logged in as {}", signer.public_key());
        return Ok(());
    }

    // Demo mode short-circuit (ignore other args except conflicting ones)
    if parsed.demo || matches!(parsed.endpoint.as_deref(), Some("demo")) {
        return run_demo_mode(parsed.sweep).await;
    }

    let endpoints_file = load_endpoints();
    let req = EndpointRequest {
        endpoint_name: parsed.endpoint.clone(),
        url: parsed.url.clone(),
        tls_ca: parsed.tls_ca.clone(),
    };
    let resolved = req.resolve(&endpoints_file);

    // Determine final connection parameters (and maybe mutated registry to persist)
    let mut endpoints_mut = endpoints_file.clone();
    let (url, tls_ca): (String, Option<String>) = match resolved {
        ResolveEndpoint::Direct(u, t) => {
            // Possibly save if endpoint name specified and --save or new entry
            if let Some(name) = parsed.endpoint.as_ref() {
                let existing = endpoints_mut.endpoints.get(name);
                match existing {
                    None => {
                        // New entry: auto-save immediately
                        endpoints_mut.endpoints.insert(
                            name.clone(),
                            EndpointEntry {
                                url: u.clone(),
                                tls_ca: t.clone(),
                            },
                        );
                        let _ = save_endpoints(&endpoints_mut);
                    }
                    Some(entry) => {
                        let changed = entry.url != u || entry.tls_ca != t;
                        if changed {
                            let overwrite = if parsed.save {
                                true
                            } else {
                                prompt_yes_no(&format!(
                                    "Overwrite existing endpoint '{name}'? [y/N]: "
                                ))
                            };
                            if overwrite {
                                endpoints_mut.endpoints.insert(
                                    name.clone(),
                                    EndpointEntry {
                                        url: u.clone(),
                                        tls_ca: t.clone(),
                                    },
                                );
                                let _ = save_endpoints(&endpoints_mut);
                            }
                        }
                    }
                }
            }
            (u, t)
        }
        ResolveEndpoint::Loaded(u, t) => (u, t),
        ResolveEndpoint::PromptSelect(mut names) => {
            // Always add demo option to list
            if !names.iter().any(|n| n == "demo") {
                names.push("demo".into());
            }
            eprintln!("Select endpoint:");
            for (i, n) in names.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, n);
            }
            eprint!("Enter number (or blank to abort): ");
            let _ = io::stderr().flush();
            let mut line = String::new();
            if io::stdin().read_line(&mut line).is_ok() {
                if let Ok(idx) = line.trim().parse::<usize>() {
                    if idx >= 1 && idx <= names.len() {
                        let name = &names[idx - 1];
                        if name == "demo" {
                            return run_demo_mode(parsed.sweep).await;
                        }
                        if let Some(entry) = endpoints_mut.endpoints.get(name) {
                            (entry.url.clone(), entry.tls_ca.clone())
                        } else {
                            return Ok(());
                        }
                    } else {
                        return Ok(());
                    }
                } else {
                    return Ok(());
                }
            } else {
                return Ok(());
            }
        }
        ResolveEndpoint::PromptCreate(name) => {
            eprintln!("Endpoint '{name}' does not exist yet.");
            let url = prompt_string("Enter URL (https://HOST or wss://HOST/api/v1/ws): ")?;
            if url.trim().is_empty() {
                return Ok(());
            }
            let ca = prompt_string("Enter TLS CA path (or leave blank): ")?;
            let ca_opt = if ca.trim().is_empty() {
                None
            } else {
                Some(ca.trim().to_string())
            };
            endpoints_mut.endpoints.insert(
                name.clone(),
                EndpointEntry {
                    url: url.trim().to_string(),
                    tls_ca: ca_opt.clone(),
                },
            );
            let _ = save_endpoints(&endpoints_mut);
            (url.trim().to_string(), ca_opt)
        }
        ResolveEndpoint::None => {
            eprintln!("No URL provided and no endpoints to select.");
            return Ok(());
        }
    };

    // The signing key may still be materializing (fresh login from
    // another terminal); give it a bounded moment rather than failing
    // outright or polling forever.
    let signer = match acquire_signer().await {
        Ok(s) => s,
        Err(err) => {
            eprintln!("{err}");
            eprintln!("no operator identity; run `streamtop --login` first");
            return Ok(());
        }
    };

    let label = parsed.endpoint.clone().unwrap_or_else(|| url.clone());
    let cfg = ClientConfig {
        url: metrics_url(&url),
        tls_ca,
        sweep: parsed.sweep,
    };
    let mut app = App::new(cfg, signer, label);
    app.run().await
}

async fn acquire_signer() -> Result<Arc<dyn Signer>, streamtop::retry::WaitTimeout> {
    wait_for(
        "signer",
        Duration::from_secs(1),
        Duration::from_millis(100),
        || async {
            if !SESSION.is_logged_in() {
                return None;
            }
            std::fs::read_to_string(identity_path())
                .ok()
                .and_then(|hex| KeySigner::from_hex(&hex).ok())
                .map(|s| Arc::new(s) as Arc<dyn Signer>)
        },
    )
    .await
}

fn prompt_yes_no(prompt: &str) -> bool {
    eprint!("{prompt}");
    let _ = io::stderr().flush();
    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_ok() {
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    } else {
        false
    }
}

fn prompt_string(prompt: &str) -> io::Result<String> {
    eprint!("{prompt}");
    let _ = io::stderr().flush();
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line)
}

// --- Demo Mode ---

async fn run_demo_mode(sweep: SweepConfig) -> anyhow::Result<()> {
    let port = 3230;
    let url = format!("ws://127.0.0.1:{port}/api/v1/ws");
    let child = spawn_simulator(port)?;
    // Ephemeral identity; the simulator admits any key that verifies.
    let signer: Arc<dyn Signer> = Arc::new(KeySigner::generate());
    let cfg = ClientConfig {
        url,
        tls_ca: None,
        sweep,
    };
    let mut app = App::new(cfg, signer, "demo".into());
    // Use select to handle Ctrl-C and normal quit
    tokio::select! {
        res = app.run() => { drop(child); res }
        _ = tokio::signal::ctrl_c() => {
            // Drop child (kills simulator) then return
            drop(child);
            Ok(())
        }
    }
}

struct SimGuard(std::sync::Arc<std::sync::Mutex<Option<std::process::Child>>>);
impl Drop for SimGuard {
    fn drop(&mut self) {
        if let Some(mut ch) = self.0.lock().unwrap().take() {
            let _ = ch.kill();
        }
    }
}

fn spawn_simulator(port: u16) -> anyhow::Result<SimGuard> {
    let candidate = find_simulator_executable();
    let mut cmd = std::process::Command::new(candidate);
    cmd.arg("--port").arg(port.to_string());
    let child = cmd.spawn()?;
    // Give the simulator a brief moment to bind
    std::thread::sleep(std::time::Duration::from_millis(300));
    Ok(SimGuard(std::sync::Arc::new(std::sync::Mutex::new(Some(
        child,
    )))))
}

fn find_simulator_executable() -> std::path::PathBuf {
    let self_exe = std::env::current_exe().ok();
    if let Some(exe) = self_exe {
        if let Some(parent) = exe.parent() {
            #[cfg(windows)]
            let name = "streamtop_sim.exe";
            #[cfg(not(windows))]
            let name = "streamtop_sim";
            let candidate = parent.join(name);
            if candidate.exists() {
                return candidate;
            }
        }
    }
    // Fallback to relying on PATH
    std::path::PathBuf::from("streamtop_sim")
}
