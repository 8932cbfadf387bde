//! Method descriptor resolution.
//!
//! A [`SchemaSource`] is either inline `.proto` text (compiled at runtime
//! with `protox`, resolving imports through the configured search paths and
//! the bundled well-known types) or an encoded `FileDescriptorSet`.
//! [`resolve_method`] compiles the source and looks up the unary method
//! named by the call identifier.

use crate::common::SchemaError;
use bytes::Bytes;
use prost_reflect::{DescriptorPool, MethodDescriptor};
use protox::file::{ChainFileResolver, File, FileResolver, GoogleFileResolver, IncludeFileResolver};
use std::path::{Path, PathBuf};

/// Where the method's schema comes from. Exactly one source is active.
#[derive(Clone, Debug)]
pub enum SchemaSource {
    /// `.proto` text compiled at runtime.
    ///
    /// `name` is the file name the text is registered under; other files
    /// import it by that name. Imports are searched in `import_paths`, in
    /// order.
    Inline {
        name: String,
        source: String,
        import_paths: Vec<PathBuf>,
    },
    /// An encoded `google.protobuf.FileDescriptorSet` containing the service
    /// and all of its dependencies.
    Protoset(Bytes),
}

impl SchemaSource {
    /// Picks the single configured source out of two optional ones.
    ///
    /// `proto` is a `(name, text)` pair.
    pub fn from_options(
        proto: Option<(String, String)>,
        protoset: Option<Bytes>,
        import_paths: Vec<PathBuf>,
    ) -> Result<Self, SchemaError> {
        match (proto, protoset) {
            (Some((name, source)), None) => Ok(Self::Inline {
                name,
                source,
                import_paths,
            }),
            (None, Some(set)) => Ok(Self::Protoset(set)),
            (Some(_), Some(_)) => Err(SchemaError::AmbiguousSource),
            (None, None) => Err(SchemaError::MissingSource),
        }
    }

    fn source_name(&self) -> &str {
        match self {
            Self::Inline { name, .. } => name,
            Self::Protoset(_) => "<protoset>",
        }
    }

    fn descriptor_pool(&self) -> Result<DescriptorPool, SchemaError> {
        let parse_error = |reason: String| SchemaError::Parse {
            source_name: self.source_name().to_owned(),
            reason,
        };

        match self {
            Self::Inline {
                name,
                source,
                import_paths,
            } => {
                let mut resolver = ChainFileResolver::new();
                resolver.add(InlineFileResolver {
                    name: name.clone(),
                    source: source.clone(),
                });
                for path in import_paths {
                    resolver.add(IncludeFileResolver::new(path.clone()));
                }
                resolver.add(GoogleFileResolver::new());

                let mut compiler = protox::Compiler::with_file_resolver(resolver);
                compiler.include_imports(true);
                compiler
                    .open_file(name)
                    .map_err(|e| parse_error(e.to_string()))?;
                Ok(compiler.descriptor_pool())
            }
            Self::Protoset(set) => {
                DescriptorPool::decode(set.clone()).map_err(|e| parse_error(e.to_string()))
            }
        }
    }
}

/// Serves a single in-memory file; every other name falls through to the
/// next resolver in the chain.
struct InlineFileResolver {
    name: String,
    source: String,
}

impl FileResolver for InlineFileResolver {
    fn resolve_path(&self, path: &Path) -> Option<String> {
        (path == Path::new(&self.name)).then(|| self.name.clone())
    }

    fn open_file(&self, name: &str) -> Result<File, protox::Error> {
        if name == self.name {
            File::from_source(name, &self.source)
        } else {
            Err(protox::Error::file_not_found(name))
        }
    }
}

/// Splits `package.Service/Method` (or `package.Service.Method`) into its
/// service and method parts.
fn split_call(call: &str) -> Option<(&str, &str)> {
    let call = call.trim_start_matches('/');
    let (service, method) = match call.rsplit_once('/') {
        Some(parts) => parts,
        None => call.rsplit_once('.')?,
    };
    (!service.is_empty() && !method.is_empty()).then_some((service, method))
}

/// Resolves the unary method named by `call` against `source`.
///
/// # Errors
///
/// - [`SchemaError::InvalidCall`] if `call` has no service part.
/// - [`SchemaError::Parse`] if the source does not compile or decode.
/// - [`SchemaError::MethodNotFound`] if the service or method is absent.
/// - [`SchemaError::Streaming`] if the method streams in either direction.
#[cfg_attr(feature = "tracing", tracing::instrument(skip(source)))]
pub fn resolve_method(call: &str, source: &SchemaSource) -> Result<MethodDescriptor, SchemaError> {
    let (service, method) = split_call(call).ok_or_else(|| SchemaError::InvalidCall {
        call: call.to_owned(),
    })?;

    let pool = source.descriptor_pool()?;
    let method = pool
        .get_service_by_name(service)
        .and_then(|s| s.methods().find(|m| m.name() == method))
        .ok_or_else(|| SchemaError::MethodNotFound {
            call: call.to_owned(),
        })?;

    if method.is_client_streaming() || method.is_server_streaming() {
        return Err(SchemaError::Streaming {
            call: call.to_owned(),
        });
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(
        input = method.input().full_name(),
        output = method.output().full_name(),
        "Resolved method"
    );

    Ok(method)
}
