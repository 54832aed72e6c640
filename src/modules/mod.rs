pub mod accounts;
pub mod blog;
pub mod books;
pub mod library;

#[cfg(test)]
pub mod testing;

use folio_kernel::ModuleRegistry;

/// Register all project-specific modules with the registry
pub fn register_all(registry: &mut ModuleRegistry) {
    registry.register_custom(accounts::create_module());
    registry.register_custom(books::create_module());
    registry.register_custom(library::create_module());
    registry.register_custom(blog::create_module());
}
