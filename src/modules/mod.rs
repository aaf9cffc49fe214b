pub mod books;

use catalog_db::Db;
use catalog_kernel::ModuleRegistry;

/// Register all project modules with the registry
pub fn register_all(registry: &mut ModuleRegistry, db: &Db) {
    registry.register(books::create_module(db.clone()));
}
