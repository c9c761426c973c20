//! Framework launch table.
//!
//! Each [`Framework`] variant knows its conventional ports, how its dev
//! server is launched, whether it goes through a bundler build first, what it
//! prints once it is listening, and which tips are worth showing a student.
//! Every lookup is an exhaustive `match`, so adding a framework forces every
//! table to be filled in.

use crate::config::ServerRequest;
use crate::server::ServiceConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Development server flavour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Framework {
    React,
    NextJs,
    Vue,
    Angular,
    Svelte,
    Vite,
    Flask,
    FastApi,
    Django,
    Express,
    Static,
    #[default]
    Custom,
}

/// Launch command, arguments and environment for one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchProfile {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl Framework {
    /// All known frameworks.
    pub const ALL: [Framework; 12] = [
        Framework::React,
        Framework::NextJs,
        Framework::Vue,
        Framework::Angular,
        Framework::Svelte,
        Framework::Vite,
        Framework::Flask,
        Framework::FastApi,
        Framework::Django,
        Framework::Express,
        Framework::Static,
        Framework::Custom,
    ];

    /// Parse a framework tag. Unknown tags map to [`Framework::Custom`].
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "react" | "create-react-app" | "cra" => Framework::React,
            "next" | "nextjs" | "next.js" => Framework::NextJs,
            "vue" | "vuejs" => Framework::Vue,
            "angular" => Framework::Angular,
            "svelte" | "sveltekit" => Framework::Svelte,
            "vite" => Framework::Vite,
            "flask" => Framework::Flask,
            "fastapi" => Framework::FastApi,
            "django" => Framework::Django,
            "express" | "node" => Framework::Express,
            "static" | "html" => Framework::Static,
            _ => Framework::Custom,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::React => "react",
            Framework::NextJs => "nextjs",
            Framework::Vue => "vue",
            Framework::Angular => "angular",
            Framework::Svelte => "svelte",
            Framework::Vite => "vite",
            Framework::Flask => "flask",
            Framework::FastApi => "fastapi",
            Framework::Django => "django",
            Framework::Express => "express",
            Framework::Static => "static",
            Framework::Custom => "custom",
        }
    }

    /// Broad server category, recorded as the allocation's service type.
    pub fn kind(&self) -> &'static str {
        match self {
            Framework::React
            | Framework::NextJs
            | Framework::Vue
            | Framework::Angular
            | Framework::Svelte
            | Framework::Vite => "frontend",
            Framework::Flask | Framework::FastApi | Framework::Django | Framework::Express => {
                "backend"
            }
            Framework::Static => "static",
            Framework::Custom => "custom",
        }
    }

    /// Conventional ports, most preferred first.
    pub fn preferred_ports(&self) -> &'static [u16] {
        match self {
            Framework::React => &[3000, 3001, 3002, 3003],
            Framework::NextJs => &[3000, 3001, 3002, 3003],
            Framework::Vue => &[8080, 8081, 5173, 5174],
            Framework::Angular => &[4200, 4201, 4202, 4203],
            Framework::Svelte => &[5173, 5174, 5000, 8080],
            Framework::Vite => &[5173, 5174, 5175, 5176],
            Framework::Flask => &[5000, 5001, 5002, 5003],
            Framework::FastApi => &[8000, 8001, 8002, 8003],
            Framework::Django => &[8000, 8001, 8080, 8888],
            Framework::Express => &[3000, 3001, 8000, 8080],
            Framework::Static => &[8080, 8000, 5500, 3000],
            Framework::Custom => &[],
        }
    }

    /// Whether the dev server runs a bundler build before it listens.
    pub fn is_bundled(&self) -> bool {
        matches!(
            self,
            Framework::React
                | Framework::NextJs
                | Framework::Vue
                | Framework::Angular
                | Framework::Svelte
                | Framework::Vite
        )
    }

    /// Typical unoptimized bundle size in kilobytes.
    pub(crate) fn typical_bundle_kb(&self) -> u64 {
        match self {
            Framework::React => 540,
            Framework::NextJs => 720,
            Framework::Vue => 410,
            Framework::Angular => 980,
            Framework::Svelte => 120,
            Framework::Vite => 260,
            _ => 0,
        }
    }

    /// Launch command, default arguments and environment for `port`.
    pub fn launch_profile(&self, port: u16, request: &ServerRequest) -> LaunchProfile {
        let p = port.to_string();
        let hot = request.hot_reload;
        let optimized = request.build_optimization;
        let mut env = HashMap::new();

        let (command, args): (&str, Vec<String>) = match self {
            Framework::React => {
                env.insert("PORT".to_string(), p.clone());
                env.insert("BROWSER".to_string(), "none".to_string());
                env.insert("FAST_REFRESH".to_string(), hot.to_string());
                if optimized {
                    env.insert("GENERATE_SOURCEMAP".to_string(), "false".to_string());
                }
                ("npm", strings(&["start"]))
            }
            Framework::NextJs => {
                if optimized {
                    ("npx", strings(&["next", "start", "-p", &p]))
                } else {
                    ("npx", strings(&["next", "dev", "-p", &p]))
                }
            }
            Framework::Vue => {
                let mut args = strings(&["vue-cli-service", "serve", "--port", &p]);
                if optimized {
                    args.extend(strings(&["--mode", "production"]));
                }
                ("npx", args)
            }
            Framework::Angular => {
                let mut args = strings(&["ng", "serve", "--port", &p]);
                if !hot {
                    args.push("--no-live-reload".to_string());
                }
                if optimized {
                    args.extend(strings(&["--configuration", "production"]));
                }
                ("npx", args)
            }
            Framework::Svelte | Framework::Vite => {
                let mut args = strings(&["vite", "--port", &p, "--strictPort"]);
                if optimized {
                    args.extend(strings(&["--mode", "production"]));
                }
                ("npx", args)
            }
            Framework::Flask => {
                env.insert("FLASK_APP".to_string(), "app.py".to_string());
                env.insert("FLASK_RUN_PORT".to_string(), p.clone());
                env.insert("FLASK_DEBUG".to_string(), if hot { "1" } else { "0" }.to_string());
                ("python", strings(&["-m", "flask", "run", "--port", &p]))
            }
            Framework::FastApi => {
                let mut args = strings(&["-m", "uvicorn", "main:app", "--port", &p]);
                if hot {
                    args.push("--reload".to_string());
                }
                if optimized {
                    args.extend(strings(&["--workers", "2"]));
                }
                ("python", args)
            }
            Framework::Django => {
                let mut args = strings(&["manage.py", "runserver", &p]);
                if !hot {
                    args.push("--noreload".to_string());
                }
                if optimized {
                    env.insert("DJANGO_DEBUG".to_string(), "False".to_string());
                }
                ("python", args)
            }
            Framework::Express => {
                env.insert("PORT".to_string(), p.clone());
                if hot {
                    ("npx", strings(&["nodemon", "server.js"]))
                } else {
                    ("node", strings(&["server.js"]))
                }
            }
            Framework::Static => ("python", strings(&["-m", "http.server", &p])),
            Framework::Custom => {
                env.insert("PORT".to_string(), p.clone());
                match &request.custom_command {
                    Some(command) => (command.as_str(), request.custom_args.clone()),
                    None => ("npm", strings(&["run", "dev"])),
                }
            }
        };

        if optimized && self.is_bundled() {
            env.insert("NODE_ENV".to_string(), "production".to_string());
        } else if self.is_bundled() || matches!(self, Framework::Express) {
            env.insert("NODE_ENV".to_string(), "development".to_string());
        }

        env.extend(request.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        LaunchProfile {
            command: command.to_string(),
            args,
            env,
        }
    }

    /// Resolve a full service configuration for `port`.
    pub fn service_config(&self, port: u16, request: &ServerRequest) -> ServiceConfig {
        let profile = self.launch_profile(port, request);
        ServiceConfig {
            framework: *self,
            port,
            command: profile.command,
            args: profile.args,
            env: profile.env,
            working_directory: request.working_directory.clone(),
            auto_restart: request.auto_restart,
            hot_reload: request.hot_reload,
            build_optimization: request.build_optimization,
        }
    }

    /// Lines the dev server prints once it is listening.
    pub fn startup_lines(&self, name: &str, config: &ServiceConfig) -> Vec<String> {
        let port = config.port;
        match self {
            Framework::React => vec![
                "Compiled successfully!".to_string(),
                format!("You can now view {} in the browser.", name),
                format!("  Local:            http://localhost:{}", port),
            ],
            Framework::NextJs => vec![format!(
                "ready - started server on 0.0.0.0:{}, url: http://localhost:{}",
                port, port
            )],
            Framework::Vue => vec![
                "App running at:".to_string(),
                format!("  - Local:   http://localhost:{}/", port),
            ],
            Framework::Angular => vec![format!(
                "** Angular Live Development Server is listening on localhost:{}, open your browser on http://localhost:{}/ **",
                port, port
            )],
            Framework::Svelte | Framework::Vite => vec![
                "VITE ready".to_string(),
                format!("  Local:   http://localhost:{}/", port),
            ],
            Framework::Flask => vec![
                " * Serving Flask app 'app.py'".to_string(),
                format!(" * Debug mode: {}", if config.hot_reload { "on" } else { "off" }),
                format!(" * Running on http://127.0.0.1:{}", port),
                "Press CTRL+C to quit".to_string(),
            ],
            Framework::FastApi => vec![
                "INFO:     Started server process".to_string(),
                "INFO:     Application startup complete.".to_string(),
                format!(
                    "INFO:     Uvicorn running on http://127.0.0.1:{} (Press CTRL+C to quit)",
                    port
                ),
            ],
            Framework::Django => vec![
                "System check identified no issues (0 silenced).".to_string(),
                format!("Starting development server at http://127.0.0.1:{}/", port),
                "Quit the server with CONTROL-C.".to_string(),
            ],
            Framework::Express => vec![format!("Server listening on http://localhost:{}", port)],
            Framework::Static => vec![format!(
                "Serving HTTP on 0.0.0.0 port {} (http://0.0.0.0:{}/) ...",
                port, port
            )],
            Framework::Custom => vec![format!(
                "Process started: {} {}",
                config.command,
                config.args.join(" ")
            )
            .trim_end()
            .to_string()],
        }
    }

    /// Framework-appropriate tips for a freshly started server.
    pub fn recommendations(&self, config: &ServiceConfig) -> Vec<String> {
        let mut tips: Vec<String> = match self {
            Framework::React => vec![
                "Keep components small and lift shared state up to a common parent.".to_string(),
                "Use the React DevTools extension to inspect props and state.".to_string(),
            ],
            Framework::NextJs => vec![
                "Pages under app/ or pages/ become routes automatically.".to_string(),
                "Prefer server components for data fetching to keep bundles small.".to_string(),
            ],
            Framework::Vue => vec![
                "Use computed properties instead of methods for derived state.".to_string(),
            ],
            Framework::Angular => vec![
                "Generate components with `ng generate component` to keep structure consistent."
                    .to_string(),
            ],
            Framework::Svelte | Framework::Vite => vec![
                "Vite serves source files over native ES modules, so restarts are rarely needed."
                    .to_string(),
            ],
            Framework::Flask => vec![
                "Never run the Flask development server in production; use a WSGI server."
                    .to_string(),
                "Blueprints help split a growing app into modules.".to_string(),
            ],
            Framework::FastApi => vec![
                format!(
                    "Interactive API docs are served at http://127.0.0.1:{}/docs.",
                    config.port
                ),
                "Declare request bodies as Pydantic models to get validation for free.".to_string(),
            ],
            Framework::Django => vec![
                "Run `python manage.py migrate` after changing models.".to_string(),
            ],
            Framework::Express => vec![
                "Register error-handling middleware last so it catches every route.".to_string(),
            ],
            Framework::Static => vec![
                "Static servers do not execute code; changes appear on browser refresh."
                    .to_string(),
            ],
            Framework::Custom => vec![
                "Make sure your command reads the PORT environment variable.".to_string(),
            ],
        };

        if !config.hot_reload && !matches!(self, Framework::Static | Framework::Custom) {
            tips.push("Enable hot reload to see changes without restarting the server.".to_string());
        }
        if config.build_optimization && self.is_bundled() {
            tips.push(
                "Production build flags are on: error overlays and source maps may be reduced."
                    .to_string(),
            );
        }

        tips
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Framework {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Framework::from_tag(s))
    }
}

impl From<String> for Framework {
    fn from(tag: String) -> Self {
        Framework::from_tag(&tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(framework: Framework) -> ServerRequest {
        ServerRequest::new("demo", framework)
    }

    #[test]
    fn test_unknown_tag_is_custom() {
        assert_eq!(Framework::from_tag("Rocket"), Framework::Custom);
        assert_eq!(Framework::from_tag("Next.js"), Framework::NextJs);
        assert_eq!("FASTAPI".parse::<Framework>().unwrap(), Framework::FastApi);
    }

    #[test]
    fn test_every_framework_but_custom_has_preferences() {
        for framework in Framework::ALL {
            let ports = framework.preferred_ports();
            assert_eq!(ports.is_empty(), framework == Framework::Custom, "{}", framework);
        }
    }

    #[test]
    fn test_flask_profile_and_startup_line() {
        let config = Framework::Flask.service_config(5000, &request(Framework::Flask));

        assert_eq!(config.command, "python");
        assert!(config.args.contains(&"5000".to_string()));
        assert_eq!(config.env.get("FLASK_RUN_PORT"), Some(&"5000".to_string()));

        let lines = Framework::Flask.startup_lines("demo", &config);
        assert!(lines.iter().any(|l| l.contains("Running on http://127.0.0.1:5000")));
    }

    #[test]
    fn test_custom_uses_caller_command() {
        let mut req = request(Framework::Custom);
        req.custom_command = Some("cargo".to_string());
        req.custom_args = vec!["run".to_string()];

        let profile = Framework::Custom.launch_profile(7000, &req);
        assert_eq!(profile.command, "cargo");
        assert_eq!(profile.args, vec!["run"]);
    }

    #[test]
    fn test_caller_env_overrides_defaults() {
        let mut req = request(Framework::React);
        req.build_optimization = true;
        req.env.insert("NODE_ENV".to_string(), "test".to_string());

        let profile = Framework::React.launch_profile(3000, &req);
        assert_eq!(profile.env.get("NODE_ENV"), Some(&"test".to_string()));
        assert_eq!(profile.env.get("GENERATE_SOURCEMAP"), Some(&"false".to_string()));
    }

    #[test]
    fn test_hot_reload_flags() {
        let mut req = request(Framework::FastApi);
        req.hot_reload = true;
        let profile = Framework::FastApi.launch_profile(8000, &req);
        assert!(profile.args.contains(&"--reload".to_string()));

        req.hot_reload = false;
        let profile = Framework::Django.launch_profile(8000, &req);
        assert!(profile.args.contains(&"--noreload".to_string()));
    }
}
