use anyhow::{Context, bail};
use bytes::Bytes;
use clap::Parser;
use core::time::Duration;
use labench_grpc_core::{
    ConnectionPolicy, FactoryConfig, GenericValue, PayloadSource, SchemaSource,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Command-line and environment configuration for the `labench` binary.
///
/// What to call lives in the YAML run file; how hard to push lives here so
/// the same run file can be replayed at different loads.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "labench",
    version,
    about = "A closed-loop load generator for unary gRPC methods"
)]
pub struct CliArgs {
    /// Path to the YAML run file.
    ///
    /// Environment variable: `LABENCH_CONFIG`
    #[arg(env = "LABENCH_CONFIG", default_value = "labench.yaml")]
    pub config: PathBuf,

    /// Number of concurrent clients, each owning one requester.
    ///
    /// Overrides `Clients` from the run file. Defaults to the number of
    /// logical CPUs.
    ///
    /// Environment variable: `CLIENTS`
    #[arg(long, env = "CLIENTS")]
    pub clients: Option<usize>,

    /// Number of calls each client issues before stopping.
    ///
    /// Environment variable: `REQUESTS`
    #[arg(long, env = "REQUESTS", default_value_t = 1000)]
    pub requests: u64,

    /// Per-call deadline in milliseconds. No deadline when unset.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_MS`
    #[arg(long, env = "REQUEST_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Connection establishment timeout in milliseconds.
    ///
    /// Environment variable: `CONNECT_TIMEOUT_MS`
    #[arg(long, env = "CONNECT_TIMEOUT_MS", default_value_t = 5000)]
    pub connect_timeout_ms: u64,
}

/// Top level of the YAML run file.
///
/// Engine parameters that `labench` does not use (request rate, duration,
/// HTTP options) are ignored so existing run files keep loading.
#[derive(Debug, Default, Deserialize)]
pub struct RunFile {
    #[serde(rename = "Protocol", default)]
    pub protocol: Option<String>,
    #[serde(rename = "Clients", default)]
    pub clients: Option<usize>,
    #[serde(rename = "GRPCRequest", default)]
    pub grpc_request: Option<GrpcRequestSection>,
}

/// The `GRPCRequest` section of a run file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct GrpcRequestSection {
    pub host: String,
    pub call: String,
    #[serde(default)]
    pub share_channel: bool,
    /// Structured payload.
    #[serde(default)]
    pub data: Option<GenericValue>,
    /// Protobuf JSON payload text.
    #[serde(rename = "DataJSON", default)]
    pub data_json: Option<String>,
    /// Path to a wire-encoded payload.
    #[serde(default)]
    pub data_bin: Option<PathBuf>,
    #[serde(default)]
    pub header: BTreeMap<String, String>,
    /// Path to a `.proto` file, searched in the working directory and then
    /// in `ImportPaths`.
    #[serde(default)]
    pub proto: Option<PathBuf>,
    /// Path to an encoded `FileDescriptorSet`.
    #[serde(default)]
    pub protoset: Option<PathBuf>,
    #[serde(default)]
    pub import_paths: Vec<PathBuf>,
}

impl RunFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read run file `{}`", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid run file `{}`", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub factory: FactoryConfig,
    pub clients: usize,
    pub requests: u64,
    pub connect_timeout: Duration,
}

impl TryFrom<CliArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let file = RunFile::load(&args.config)?;
        Self::from_run_file(&args, file)
    }
}

impl RunConfig {
    pub fn from_run_file(args: &CliArgs, file: RunFile) -> anyhow::Result<Self> {
        if let Some(protocol) = file.protocol.as_deref() {
            if !protocol.eq_ignore_ascii_case("grpc") {
                bail!("Protocol `{protocol}` is not supported; only GRPC runs are available");
            }
        }

        let Some(section) = file.grpc_request else {
            bail!("run file has no `GRPCRequest` section");
        };

        let clients = args.clients.or(file.clients).unwrap_or_else(num_cpus::get);
        if clients == 0 {
            bail!("CLIENTS must be greater than 0");
        }
        if args.requests == 0 {
            bail!("REQUESTS must be greater than 0");
        }

        let factory = section.into_factory_config(args.timeout_ms.map(Duration::from_millis))?;

        Ok(Self {
            factory,
            clients,
            requests: args.requests,
            connect_timeout: Duration::from_millis(args.connect_timeout_ms),
        })
    }
}

impl GrpcRequestSection {
    fn into_factory_config(self, timeout: Option<Duration>) -> anyhow::Result<FactoryConfig> {
        let proto = self
            .proto
            .as_deref()
            .map(|path| load_proto(path, &self.import_paths))
            .transpose()?;
        let protoset = self
            .protoset
            .as_deref()
            .map(|path| read_bytes(path, "Protoset"))
            .transpose()?;
        let schema = SchemaSource::from_options(proto, protoset, self.import_paths)?;

        let binary = self
            .data_bin
            .as_deref()
            .map(|path| read_bytes(path, "DataBin"))
            .transpose()?;
        let payload = PayloadSource::from_options(self.data, self.data_json, binary)?;

        let mut builder = FactoryConfig::builder(self.host, self.call)
            .schema(schema)
            .payload(payload)
            .connection(ConnectionPolicy::from_shared(self.share_channel))
            .headers(&self.header)?;
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

/// Reads a `.proto` file, registering it under the name it was given so
/// that other files can import it by that name.
fn load_proto(path: &Path, import_paths: &[PathBuf]) -> anyhow::Result<(String, String)> {
    let candidate = core::iter::once(path.to_path_buf())
        .chain(import_paths.iter().map(|dir| dir.join(path)))
        .find(|candidate| candidate.is_file())
        .with_context(|| {
            format!(
                "Proto `{}` was not found in the working directory or in ImportPaths",
                path.display()
            )
        })?;
    let text = fs::read_to_string(&candidate)
        .with_context(|| format!("failed to read Proto `{}`", candidate.display()))?;
    Ok((path.to_string_lossy().into_owned(), text))
}

fn read_bytes(path: &Path, key: &str) -> anyhow::Result<Bytes> {
    fs::read(path)
        .map(Bytes::from)
        .with_context(|| format!("failed to read {key} `{}`", path.display()))
}
