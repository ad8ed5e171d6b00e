#[macro_export]
macro_rules! declare_shared_cache_plugin {
    ($name:expr, $ty:ty) => {
        #[ctor::ctor]
        fn __register_shared_cache_plugin() {
            use std::sync::Arc;
            use $crate::cache::register::register_shared_cache_plugin;

            register_shared_cache_plugin(
                $name,
                Arc::new(|| {
                    Box::pin(async {
                        let cache = <$ty>::new()?;
                        Ok(Box::new(cache) as Box<dyn $crate::cache::traits::SharedCache>)
                    })
                }),
            );
        }
    };
}
