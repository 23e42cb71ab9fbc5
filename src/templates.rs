use std::path::Path;
use std::sync::OnceLock;
use tera::Tera;

static TERA: OnceLock<Tera> = OnceLock::new();

/// Dashboard templates from `templates/*.html`, loaded once. A directory that
/// cannot be read leaves the set empty and every render reports an error.
pub fn get_tera() -> &'static Tera {
    TERA.get_or_init(|| {
        let mut tera = Tera::default();
        let template_dir = Path::new("templates");
        let entries = match std::fs::read_dir(template_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %template_dir.display(), error = %e, "no page templates loaded");
                return tera;
            }
        };

        let files: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "html"))
            .filter_map(|p| {
                let name = p.file_name()?.to_str()?.to_string();
                Some((p, Some(name)))
            })
            .collect();

        if let Err(e) = tera.add_template_files(files) {
            tracing::error!(error = %e, "failed to load page templates");
        }
        tera
    })
}
