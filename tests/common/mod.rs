#![allow(dead_code)]

pub mod log_capture {
    use std::io;
    use std::sync::{Arc, Mutex};

    use tracing::subscriber::DefaultGuard;

    #[derive(Clone, Default)]
    pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Captures every event emitted on the current thread while alive.
    ///
    /// Only deliveries that run inline on the test thread are visible.
    pub struct LogCapture {
        buf: SharedBuf,
        _guard: DefaultGuard,
    }

    impl LogCapture {
        pub fn init() -> Self {
            let buf = SharedBuf::default();
            let writer = buf.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(move || writer.clone())
                .with_ansi(false)
                .with_max_level(tracing::Level::TRACE)
                .finish();
            let guard = tracing::subscriber::set_default(subscriber);
            Self { buf, _guard: guard }
        }

        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.buf.0.lock().unwrap()).into_owned()
        }

        pub fn count(&self, needle: &str) -> usize {
            self.contents().matches(needle).count()
        }
    }
}

pub mod fixtures {
    use std::sync::Arc;

    use mqroute::{Cache, MemoryCache, MemoryTransport, Router, RouterConfig, Transport};

    pub fn config(name: &str) -> RouterConfig {
        RouterConfig::new(name, "tcp://localhost:1883", format!("{name}-client"))
    }

    /// Router on an inline `MemoryTransport`, without dedup.
    pub fn router(name: &str) -> (Router, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        let router = Router::builder(config(name))
            .transport(Arc::clone(&transport) as Arc<dyn Transport>)
            .build()
            .unwrap();
        (router, transport)
    }

    /// Router with dedup enabled on the given cache.
    pub fn dedup_router(
        name: &str,
        transport: Arc<MemoryTransport>,
        cache: Arc<MemoryCache>,
    ) -> Router {
        let mut config = config(name);
        config.dedup = true;
        Router::builder(config)
            .transport(transport as Arc<dyn Transport>)
            .cache(cache as Arc<dyn Cache>)
            .build()
            .unwrap()
    }
}

pub mod may_runtime {
    use std::sync::Once;

    static MAY_INIT: Once = Once::new();

    pub fn setup() {
        MAY_INIT.call_once(|| {
            may::config().set_workers(4);
        });
    }
}
