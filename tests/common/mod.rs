use lazy_static::lazy_static;

lazy_static! {
    static ref TRACING: () = {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init();
    };
}

pub fn init_tracing() {
    lazy_static::initialize(&TRACING);
}
