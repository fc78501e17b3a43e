//! Interface de linha de comando do formicary baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (pack, unpack, inspect)
//! e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// formicary: empacota, desempacota e inspeciona arquivos de jobs.
#[derive(Debug, Parser)]
#[command(name = "formicary", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho alternativo para o arquivo de configuração.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (nível debug).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Empacota um arquivo ou pasta em um arquivo `.antpack.zip`.
    Pack {
        /// Arquivo ou pasta a empacotar.
        path: PathBuf,

        /// Pasta de destino do pacote (padrão: fica em `scratch_dir`).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Reconstrói o job contido em um pacote.
    Unpack {
        /// Pacote produzido por `pack`.
        archive: PathBuf,

        /// Pasta onde o asset restaurado é colocado.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Mostra o ticket de um pacote sem extrair os assets.
    Inspect {
        /// Pacote a inspecionar.
        archive: PathBuf,
    },
}
