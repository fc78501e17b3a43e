//! Interface de terminal do formicary: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`TaskProgress`] acompanha visualmente
//! uma operação de pack/unpack no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use formicary::job::Job;
use formicary::pack::Ticket;

/// Indicador visual de progresso para uma operação no terminal.
///
/// Exibe um spinner animado durante o processamento e mensagens
/// coloridas para sucesso (verde) e falha (vermelho).
pub struct TaskProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    dim: Style,
}

impl TaskProgress {
    /// Inicia o spinner com a descrição da operação.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(description.to_owned());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            dim: Style::new().dim(),
        }
    }

    /// Finaliza o spinner com sucesso.
    pub fn succeed(&self, message: &str) {
        self.pb.finish_and_clear();
        println!("  {} {message}", self.green.apply_to("✓"));
    }

    /// Finaliza o spinner com falha.
    pub fn fail(&self, message: &str) {
        self.pb.finish_and_clear();
        println!("  {} {message}", self.red.apply_to("✗"));
    }

    /// Imprime o job resultante: nome, tipo e caminho.
    pub fn print_job(&self, job: &Job) {
        let path = job
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_owned());
        println!("    {} {} ({})", self.dim.apply_to("job"), job.name(), job.kind());
        println!("    {} {path}", self.dim.apply_to("path"));
    }
}

/// Imprime o ticket com cabeçalho, propriedades e ciclo de vida.
pub fn print_ticket(ticket: &Ticket) {
    let header = Style::new().cyan().bold();
    let dim = Style::new().dim();

    println!("{}", header.apply_to("─── Ticket ───"));
    println!("  {} {}", dim.apply_to("id"), ticket.id);
    println!("  {} {}", dim.apply_to("kind"), ticket.kind);
    println!("  {} {}", dim.apply_to("name"), ticket.name);

    if !ticket.properties.is_empty() {
        println!("{}", header.apply_to("─── Properties ───"));
        for prop in &ticket.properties {
            println!(
                "  {} = {} {}",
                prop.key(),
                prop.value(),
                dim.apply_to(format!("({})", prop.inferred_type()))
            );
        }
    }

    println!("{}", header.apply_to("─── Life cycle ───"));
    for event in &ticket.life_cycle {
        println!(
            "  {} {}",
            dim.apply_to(event.timestamp().format("%Y-%m-%d %H:%M:%S")),
            event.statement()
        );
    }
}
