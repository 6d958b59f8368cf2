mod entities;
mod export_map;
mod queue;
mod settings;

pub use entities::PostgresEntityStore;
pub use export_map::PostgresExportMap;
pub use queue::PostgresQueue;
pub use settings::PostgresSettingsRepository;
