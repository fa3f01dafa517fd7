use hoard::registry::Registry;

/// Print every registered producer type with its schema and default settings.
pub fn list() {
    let registry = Registry::from_global();
    for kind in registry.prototype_kinds() {
        let Ok(prototype) = registry.prototype(&kind) else {
            continue;
        };
        println!("{kind}");
        for (column, column_kind) in prototype.schema() {
            println!("  {column:<16} {column_kind}");
        }
        println!("  defaults: {}", prototype.config_type().to_settings());
    }
}
