use polio_models::PolioError;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::context::BuildContext;

pub const APP_DIR: &str = "/app";
pub const SERVICE_PORT: u16 = 8001;
pub const SERVICE_NAME_ENV: &str = "NAME";
pub const SERVICE_NAME: &str = "PolioAPI";
pub const SERVER_BINARY: &str = "polio-api-server";
/// Must satisfy the workspace `rust-version`.
pub const BUILDER_IMAGE: &str = "rust:1.88-slim-bookworm";

/// One Dockerfile instruction. Only the forms the descriptors need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    From { image: String, alias: Option<String> },
    Workdir(String),
    Copy { from_stage: Option<String>, src: String, dest: String },
    Run(String),
    Expose(u16),
    Env { key: String, value: String },
    Cmd(Vec<String>),
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::From { image, alias: Some(alias) } => write!(f, "FROM {image} AS {alias}"),
            Directive::From { image, alias: None } => write!(f, "FROM {image}"),
            Directive::Workdir(dir) => write!(f, "WORKDIR {dir}"),
            Directive::Copy { from_stage: Some(stage), src, dest } => {
                write!(f, "COPY --from={stage} {src} {dest}")
            }
            Directive::Copy { from_stage: None, src, dest } => write!(f, "COPY {src} {dest}"),
            Directive::Run(command) => write!(f, "RUN {command}"),
            Directive::Expose(port) => write!(f, "EXPOSE {port}"),
            Directive::Env { key, value } => write!(f, "ENV {key}={}", quote_env_value(value)),
            Directive::Cmd(args) => {
                let args: Vec<String> = args.iter().map(|a| Value::String(a.clone()).to_string()).collect();
                write!(f, "CMD [{}]", args.join(", "))
            }
        }
    }
}

fn quote_env_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'' || c == '\\');
    if needs_quotes {
        Value::String(value.to_string()).to_string()
    } else {
        value.to_string()
    }
}

/// What a container started from the final image looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeContract {
    pub working_dir: String,
    pub env: BTreeMap<String, String>,
    pub exposed_ports: BTreeSet<u16>,
    pub cmd: Vec<String>,
}

/// Result of checking a build context against a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextReport {
    pub files: usize,
    pub fingerprint: String,
    /// Set when the entrypoint file is absent: the build succeeds but the
    /// container exits non-zero as soon as it starts.
    pub missing_entrypoint: Option<String>,
}

/// An ordered, non-branching list of build directives plus the files the
/// build context has to provide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescriptor {
    pub name: String,
    pub directives: Vec<Directive>,
    /// Files whose absence fails the build.
    pub required_files: Vec<String>,
    /// File the default command runs from the context; its absence only
    /// shows at container start.
    pub entrypoint_file: Option<String>,
}

impl ContainerDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directives: Vec::new(),
            required_files: Vec::new(),
            entrypoint_file: None,
        }
    }

    pub fn directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    pub fn from_image(self, image: &str) -> Self {
        self.directive(Directive::From { image: image.to_string(), alias: None })
    }

    pub fn from_stage(self, image: &str, alias: &str) -> Self {
        self.directive(Directive::From { image: image.to_string(), alias: Some(alias.to_string()) })
    }

    pub fn workdir(self, dir: &str) -> Self {
        self.directive(Directive::Workdir(dir.to_string()))
    }

    pub fn copy(self, src: &str, dest: &str) -> Self {
        self.directive(Directive::Copy { from_stage: None, src: src.to_string(), dest: dest.to_string() })
    }

    pub fn copy_from(self, stage: &str, src: &str, dest: &str) -> Self {
        self.directive(Directive::Copy {
            from_stage: Some(stage.to_string()),
            src: src.to_string(),
            dest: dest.to_string(),
        })
    }

    pub fn run(self, command: &str) -> Self {
        self.directive(Directive::Run(command.to_string()))
    }

    pub fn expose(self, port: u16) -> Self {
        self.directive(Directive::Expose(port))
    }

    pub fn env(self, key: &str, value: &str) -> Self {
        self.directive(Directive::Env { key: key.to_string(), value: value.to_string() })
    }

    pub fn cmd<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.directive(Directive::Cmd(args.into_iter().map(Into::into).collect()))
    }

    pub fn require(mut self, path: &str) -> Self {
        self.required_files.push(path.to_string());
        self
    }

    pub fn entrypoint_file(mut self, path: &str) -> Self {
        self.entrypoint_file = Some(path.to_string());
        self
    }

    /// The Python service recipe: slim 3.9 base, code in `/app`, uncached pip
    /// install, port 8001, `NAME=PolioAPI`, `python app.py`.
    pub fn python_app() -> Self {
        Self::new("python-app")
            .from_image("python:3.9-slim")
            .workdir(APP_DIR)
            .copy(".", APP_DIR)
            .run("pip install --no-cache-dir -r requirements.txt")
            .expose(SERVICE_PORT)
            .env(SERVICE_NAME_ENV, SERVICE_NAME)
            .cmd(["python", "app.py"])
            .require("requirements.txt")
            .entrypoint_file("app.py")
    }

    /// The same runtime contract for the Rust server: compiled in a builder
    /// stage, run from `/app` in a slim Debian image.
    pub fn polio_api() -> Self {
        let binary = format!("{APP_DIR}/{SERVER_BINARY}");
        Self::new("polio-api")
            .from_stage(BUILDER_IMAGE, "builder")
            .workdir("/build")
            .copy(".", "/build")
            .run(&format!("cargo build --release --bin {SERVER_BINARY}"))
            .from_image("debian:bookworm-slim")
            .workdir(APP_DIR)
            .copy_from("builder", &format!("/build/target/release/{SERVER_BINARY}"), &binary)
            .copy_from("builder", "/build/configs", &format!("{APP_DIR}/configs"))
            .expose(SERVICE_PORT)
            .env(SERVICE_NAME_ENV, SERVICE_NAME)
            .cmd([binary.as_str()])
            .require("Cargo.toml")
            .require(&format!("src/bin/{SERVER_BINARY}.rs"))
            .require("configs/default.toml")
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "python-app" => Some(Self::python_app()),
            "polio-api" => Some(Self::polio_api()),
            _ => None,
        }
    }

    /// Dockerfile text: one directive per line, a blank line before each
    /// stage after the first.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (index, directive) in self.directives.iter().enumerate() {
            if index > 0 && matches!(directive, Directive::From { .. }) {
                out.push('\n');
            }
            out.push_str(&directive.to_string());
            out.push('\n');
        }
        out
    }

    pub fn validate(&self) -> Result<(), PolioError> {
        let invalid = |reason: String| Err(PolioError::InvalidDescriptor { reason });

        match self.directives.first() {
            Some(Directive::From { .. }) => {}
            Some(other) => return invalid(format!("first directive must be FROM, found `{other}`")),
            None => return invalid("descriptor has no directives".to_string()),
        }

        let mut stages: Vec<Option<&str>> = Vec::new();
        let mut cmd_stage = None;
        for directive in &self.directives {
            match directive {
                Directive::From { alias, .. } => {
                    if let Some(alias) = alias {
                        if stages.contains(&Some(alias.as_str())) {
                            return invalid(format!("stage alias `{alias}` used twice"));
                        }
                    }
                    stages.push(alias.as_deref());
                }
                Directive::Workdir(dir) if !dir.starts_with('/') => {
                    return invalid(format!("WORKDIR must be absolute, got `{dir}`"));
                }
                Directive::Copy { from_stage: Some(stage), .. } => {
                    let current = stages.len() - 1;
                    let earlier = &stages[..current];
                    let known = earlier.contains(&Some(stage.as_str()))
                        || stage.parse::<usize>().map(|i| i < current).unwrap_or(false);
                    if !known {
                        return invalid(format!("COPY --from refers to unknown stage `{stage}`"));
                    }
                }
                Directive::Expose(0) => return invalid("EXPOSE port must be non-zero".to_string()),
                Directive::Env { key, .. } => {
                    if key.is_empty() || key.contains('=') || key.chars().any(char::is_whitespace) {
                        return invalid(format!("invalid ENV key `{key}`"));
                    }
                }
                Directive::Cmd(args) => {
                    if args.is_empty() {
                        return invalid("CMD must not be empty".to_string());
                    }
                    if cmd_stage.is_some() {
                        return invalid("more than one CMD".to_string());
                    }
                    cmd_stage = Some(stages.len() - 1);
                }
                _ => {}
            }
        }

        match cmd_stage {
            Some(stage) if stage == stages.len() - 1 => Ok(()),
            Some(_) => invalid("CMD must be in the final stage".to_string()),
            None => invalid("descriptor has no CMD".to_string()),
        }
    }

    pub fn runtime_contract(&self) -> RuntimeContract {
        let final_stage_start = self
            .directives
            .iter()
            .rposition(|d| matches!(d, Directive::From { .. }))
            .unwrap_or(0);

        let mut contract = RuntimeContract {
            working_dir: "/".to_string(),
            env: BTreeMap::new(),
            exposed_ports: BTreeSet::new(),
            cmd: Vec::new(),
        };
        for directive in &self.directives[final_stage_start..] {
            match directive {
                Directive::Workdir(dir) => contract.working_dir = dir.clone(),
                Directive::Env { key, value } => {
                    contract.env.insert(key.clone(), value.clone());
                }
                Directive::Expose(port) => {
                    contract.exposed_ports.insert(*port);
                }
                Directive::Cmd(args) => contract.cmd = args.clone(),
                _ => {}
            }
        }
        contract
    }

    /// Fails when a required file is missing; reports a missing entrypoint.
    pub fn validate_context(&self, context: &BuildContext) -> Result<ContextReport, PolioError> {
        for path in &self.required_files {
            if !context.contains(path) {
                return Err(PolioError::MissingContextFile { path: path.clone() });
            }
        }

        let missing_entrypoint = self
            .entrypoint_file
            .as_ref()
            .filter(|path| !context.contains(path))
            .cloned();

        Ok(ContextReport {
            files: context.files().len(),
            fingerprint: context.fingerprint().to_string(),
            missing_entrypoint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PYTHON_APP_DOCKERFILE: &str = "\
FROM python:3.9-slim
WORKDIR /app
COPY . /app
RUN pip install --no-cache-dir -r requirements.txt
EXPOSE 8001
ENV NAME=PolioAPI
CMD [\"python\", \"app.py\"]
";

    #[test]
    fn python_app_renders_the_seven_steps_in_order() {
        assert_eq!(ContainerDescriptor::python_app().render(), PYTHON_APP_DOCKERFILE);
    }

    #[test]
    fn presets_validate() {
        ContainerDescriptor::python_app().validate().unwrap();
        ContainerDescriptor::polio_api().validate().unwrap();
        assert!(ContainerDescriptor::preset("python-app").is_some());
        assert!(ContainerDescriptor::preset("node-app").is_none());
    }

    #[test]
    fn python_app_runtime_contract() {
        let contract = ContainerDescriptor::python_app().runtime_contract();
        assert_eq!(contract.working_dir, "/app");
        assert_eq!(contract.env.len(), 1);
        assert_eq!(contract.env["NAME"], "PolioAPI");
        assert_eq!(contract.exposed_ports.iter().copied().collect::<Vec<_>>(), vec![8001]);
        assert_eq!(contract.cmd, vec!["python", "app.py"]);
    }

    #[test]
    fn polio_api_contract_ignores_builder_stage() {
        let contract = ContainerDescriptor::polio_api().runtime_contract();
        assert_eq!(contract.working_dir, "/app");
        assert_eq!(contract.env["NAME"], "PolioAPI");
        assert!(contract.exposed_ports.contains(&8001));
        assert_eq!(contract.cmd, vec!["/app/polio-api-server"]);
    }

    #[test]
    fn multi_stage_render_separates_stages() {
        let text = ContainerDescriptor::polio_api().render();
        assert!(text.starts_with("FROM rust:1.82-slim-bookworm AS builder\n"));
        assert!(text.contains("\n\nFROM debian:bookworm-slim\n"));
        assert!(text.contains("COPY --from=builder /build/target/release/polio-api-server /app/polio-api-server\n"));
        assert!(text.ends_with("CMD [\"/app/polio-api-server\"]\n"));
    }

    #[test]
    fn env_values_are_quoted_when_needed() {
        let env = |value: &str| Directive::Env { key: "K".to_string(), value: value.to_string() }.to_string();
        assert_eq!(env("PolioAPI"), "ENV K=PolioAPI");
        assert_eq!(env("Polio API"), "ENV K=\"Polio API\"");
        assert_eq!(env(""), "ENV K=\"\"");
    }

    #[test]
    fn rejects_structural_errors() {
        let no_from = ContainerDescriptor::new("x").workdir("/app").cmd(["true"]);
        assert!(no_from.validate().is_err());

        let no_cmd = ContainerDescriptor::new("x").from_image("alpine");
        assert!(no_cmd.validate().is_err());

        let two_cmds = ContainerDescriptor::new("x").from_image("alpine").cmd(["a"]).cmd(["b"]);
        assert!(two_cmds.validate().is_err());

        let cmd_in_builder = ContainerDescriptor::new("x")
            .from_stage("rust", "builder")
            .cmd(["cargo"])
            .from_image("alpine");
        assert!(cmd_in_builder.validate().is_err());

        let bad_stage = ContainerDescriptor::new("x")
            .from_image("alpine")
            .copy_from("builder", "/a", "/b")
            .cmd(["true"]);
        assert!(bad_stage.validate().is_err());

        let relative_workdir = ContainerDescriptor::new("x").from_image("alpine").workdir("app").cmd(["true"]);
        assert!(relative_workdir.validate().is_err());

        let port_zero = ContainerDescriptor::new("x").from_image("alpine").expose(0).cmd(["true"]);
        assert!(port_zero.validate().is_err());

        let bad_env = ContainerDescriptor::new("x").from_image("alpine").env("A B", "1").cmd(["true"]);
        assert!(matches!(bad_env.validate(), Err(PolioError::InvalidDescriptor { .. })));
    }

    #[test]
    fn copy_from_numeric_stage() {
        let descriptor = ContainerDescriptor::new("x")
            .from_image("rust")
            .from_image("alpine")
            .copy_from("0", "/a", "/b")
            .cmd(["/b"]);
        descriptor.validate().unwrap();
    }
}
