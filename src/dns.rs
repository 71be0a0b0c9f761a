use futures::future::BoxFuture;
use std::sync::Arc;
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::TokioAsyncResolver;

quick_error! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum DnsError {
        NoRecords {
            display("no TXT records found")
        }
        ServerFailure(err: String) {
            display("DNS server failure: {}", err)
        }
        Io(err: String) {
            display("DNS I/O error: {}", err)
        }
    }
}

/// One TXT record. DNS limits a character-string to 255 bytes, so a record
/// may arrive split into fragments; consumers concatenate them in order
/// with no separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxtRecord {
    pub fragments: Vec<String>,
}

impl TxtRecord {
    pub fn single<S: Into<String>>(value: S) -> Self {
        TxtRecord {
            fragments: vec![value.into()],
        }
    }

    pub fn concatenated(&self) -> String {
        self.fragments.concat()
    }
}

/// DNS TXT lookup capability. The verifier core performs no I/O itself;
/// callers provide this, blocking or not.
pub trait TxtLookup: Sync + Send {
    fn lookup_txt<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Vec<TxtRecord>, DnsError>>;
}

struct TokioTxtLookup {
    resolver: TokioAsyncResolver,
}

impl TxtLookup for TokioTxtLookup {
    fn lookup_txt<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Vec<TxtRecord>, DnsError>> {
        Box::pin(async move {
            let lookup = self.resolver.txt_lookup(name).await.map_err(|err| {
                match err.kind() {
                    ResolveErrorKind::NoRecordsFound { .. } => DnsError::NoRecords,
                    ResolveErrorKind::Io(io_err) => DnsError::Io(io_err.to_string()),
                    _ => DnsError::ServerFailure(err.to_string()),
                }
            })?;

            Ok(lookup
                .iter()
                .map(|txt| TxtRecord {
                    fragments: txt
                        .txt_data()
                        .iter()
                        .map(|data| String::from_utf8_lossy(data).to_string())
                        .collect(),
                })
                .collect())
        })
    }
}

pub fn from_tokio_resolver(resolver: TokioAsyncResolver) -> Arc<dyn TxtLookup> {
    Arc::new(TokioTxtLookup { resolver })
}
