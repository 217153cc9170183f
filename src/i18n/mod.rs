//! Internationalization (i18n) module.
//!
//! Provides localized strings for CLI help and output.
//! English is the default language; Spanish is available as an alternative.

use std::sync::OnceLock;

static CURRENT_LANG: OnceLock<Lang> = OnceLock::new();

/// Supported languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    /// English (default)
    En,
    /// Spanish
    Es,
}

impl Lang {
    /// Parse a language code string (e.g. "en", "es", "en_US", "es_ES").
    /// Returns `None` for unrecognized codes.
    pub fn from_code(code: &str) -> Option<Self> {
        let normalized = code.to_lowercase();
        let prefix = normalized.split(['_', '-', '.']).next().unwrap_or("");
        match prefix {
            "en" => Some(Self::En),
            "es" => Some(Self::Es),
            _ => None,
        }
    }

    /// Return the ISO 639-1 code for this language.
    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Es => "es",
        }
    }
}

/// Initialize the global language. Call once at startup.
/// If already initialized, this is a no-op.
pub fn set_lang(lang: Lang) {
    let _ = CURRENT_LANG.set(lang);
}

/// Get the currently configured language (defaults to English).
pub fn lang() -> Lang {
    CURRENT_LANG.get().copied().unwrap_or(Lang::En)
}

/// Detect language from `MBOX2EML_LANG`, then `LC_MESSAGES` / `LANG`.
pub fn detect_system_lang() -> Lang {
    std::env::var("MBOX2EML_LANG")
        .ok()
        .and_then(|v| Lang::from_code(&v))
        .or_else(|| {
            std::env::var("LC_MESSAGES")
                .ok()
                .and_then(|v| Lang::from_code(&v))
        })
        .or_else(|| std::env::var("LANG").ok().and_then(|v| Lang::from_code(&v)))
        .unwrap_or(Lang::En)
}

/// Macro for defining translatable message functions.
/// Each function returns a `&'static str` based on the current language.
macro_rules! msg {
    ($name:ident, $en:expr, $es:expr) => {
        /// Returns a localized string for the current language.
        pub fn $name() -> &'static str {
            match lang() {
                Lang::En => $en,
                Lang::Es => $es,
            }
        }
    };
}

// ── General ──────────────────────────────────────────────────────

msg!(app_name, "mbox2eml", "mbox2eml");
msg!(
    app_about,
    "mbox2eml \u{2014} Split MBOX archives into standalone .eml files and pack them into import batches.",
    "mbox2eml \u{2014} Divide archivos MBOX en ficheros .eml independientes y los agrupa en lotes de importaci\u{f3}n."
);
msg!(
    app_long_about,
    "mbox2eml \u{2014} Split MBOX archives into standalone .eml files.\nOptionally groups the files into batches bounded by message count and size,\nso mail clients with import limits can take them one batch at a time.",
    "mbox2eml \u{2014} Divide archivos MBOX en ficheros .eml independientes.\nOpcionalmente los agrupa en lotes limitados por n\u{fa}mero de mensajes y tama\u{f1}o,\npara importarlos lote a lote en clientes de correo con l\u{ed}mites."
);
msg!(
    app_after_help,
    "Exit status: 0 all messages converted, 1 some messages failed, 2 nothing converted or fatal error.",
    "C\u{f3}digo de salida: 0 todos los mensajes convertidos, 1 algunos fallaron, 2 nada convertido o error fatal."
);

// ── CLI help strings ─────────────────────────────────────────────

msg!(
    help_verbose,
    "Verbose logging (-v info, -vv debug, -vvv trace)",
    "Registro detallado (-v info, -vv debug, -vvv trace)"
);
msg!(
    help_lang,
    "Language (en, es). Defaults to system locale",
    "Idioma (en, es). Por defecto usa el idioma del sistema"
);
msg!(
    help_cmd_convert,
    "Convert an MBOX archive into .eml files",
    "Convertir un archivo MBOX en ficheros .eml"
);
msg!(
    help_cmd_batch,
    "Group an existing directory of .eml files into import batches",
    "Agrupar un directorio de ficheros .eml existente en lotes de importaci\u{f3}n"
);
msg!(
    help_cmd_verify,
    "Check batch directories against their manifest",
    "Comprobar los directorios de lotes contra su manifiesto"
);
msg!(
    help_cmd_completions,
    "Generate shell completions",
    "Generar autocompletado para la shell"
);
msg!(
    help_cmd_manpage,
    "Generate a man page",
    "Generar p\u{e1}gina de manual"
);

// ── Progress ─────────────────────────────────────────────────────

msg!(msg_converting, "Converting", "Convirtiendo");
msg!(msg_batching, "Writing batches", "Escribiendo lotes");

// ── Summary ──────────────────────────────────────────────────────

msg!(msg_archive, "Archive", "Archivo");
msg!(msg_output_dir, "Output directory", "Directorio de salida");
msg!(msg_total_messages, "Total messages", "Total de mensajes");
msg!(msg_succeeded, "Written", "Escritos");
msg!(msg_failed, "Failed", "Fallidos");
msg!(msg_output_size, "Output size", "Tama\u{f1}o de salida");
msg!(
    msg_decode_fallbacks,
    "Undecodable headers",
    "Cabeceras no decodificables"
);
msg!(msg_batches, "Batches", "Lotes");
msg!(msg_manifest, "Instructions", "Instrucciones");
msg!(msg_elapsed, "Elapsed", "Tiempo");
msg!(msg_messages, "messages", "mensajes");

msg!(
    outcome_complete,
    "All messages converted.",
    "Todos los mensajes convertidos."
);
msg!(
    outcome_partial,
    "Some messages could not be converted; output is incomplete.",
    "Algunos mensajes no se pudieron convertir; la salida est\u{e1} incompleta."
);
msg!(
    outcome_failed,
    "No message could be converted.",
    "No se pudo convertir ning\u{fa}n mensaje."
);
msg!(
    outcome_empty,
    "No messages found.",
    "No se encontraron mensajes."
);

// ── Verify ───────────────────────────────────────────────────────

msg!(msg_expected, "Expected messages", "Mensajes esperados");
msg!(msg_found, "Found messages", "Mensajes encontrados");
msg!(msg_unparseable, "Unparseable files", "Ficheros ilegibles");
msg!(msg_missing_batches, "Missing batches", "Lotes ausentes");
msg!(
    verify_ok,
    "Batch layout matches the manifest.",
    "Los lotes coinciden con el manifiesto."
);
msg!(
    verify_mismatch,
    "Batch layout does NOT match the manifest.",
    "Los lotes NO coinciden con el manifiesto."
);

// ── Errors ───────────────────────────────────────────────────────

msg!(err_file_not_found, "File not found", "Fichero no encontrado");
msg!(err_prefix, "Error", "Error");
