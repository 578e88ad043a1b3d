use std::io::Write;

use critiq_core::{AnalysisReport, CitationRecord};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print the full analysis report: one critique block per persona, then the
/// citation table.
pub fn print_report(
    w: &mut dyn Write,
    report: &AnalysisReport,
    color: ColorMode,
) -> std::io::Result<()> {
    for result in &report.results {
        writeln!(w)?;
        let sep = "=".repeat(60);
        if color.enabled() {
            writeln!(w, "{}", sep.bold())?;
            writeln!(w, "{}", format!("PERSONA: {}", result.persona).bold())?;
            writeln!(w, "{}", sep.bold())?;
        } else {
            writeln!(w, "{}", sep)?;
            writeln!(w, "PERSONA: {}", result.persona)?;
            writeln!(w, "{}", sep)?;
        }
        writeln!(w)?;

        match (&result.analysis, &result.error) {
            (Some(analysis), _) => {
                writeln!(w, "{}", analysis)?;
            }
            (None, Some(error)) => {
                if color.enabled() {
                    writeln!(w, "{} {}", "ERROR:".red().bold(), error)?;
                } else {
                    writeln!(w, "ERROR: {}", error)?;
                }
            }
            (None, None) => {
                writeln!(w, "(no output)")?;
            }
        }
    }

    writeln!(w)?;
    print_citation_table(w, &report.citations, color)?;
    Ok(())
}

/// Print the citation table with verification marks and proof links.
pub fn print_citation_table(
    w: &mut dyn Write,
    citations: &[CitationRecord],
    color: ColorMode,
) -> std::io::Result<()> {
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", "CITATIONS".bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "CITATIONS")?;
        writeln!(w, "{}", sep)?;
    }
    writeln!(w)?;

    if citations.is_empty() {
        writeln!(w, "No citations found.")?;
        return Ok(());
    }

    for citation in citations {
        let label = match citation.sequence_id {
            Some(id) => format!("[{}]", id),
            None => "[+]".to_string(),
        };
        let title = if citation.title.is_empty() {
            "(untitled)"
        } else {
            citation.title.as_str()
        };
        let year = citation
            .year()
            .map(|y| format!(" ({})", y))
            .unwrap_or_default();

        if citation.verified {
            if color.enabled() {
                writeln!(w, "{} {} {}{}", label, "✓".green().bold(), title, year)?;
            } else {
                writeln!(w, "{} ✓ {}{}", label, title, year)?;
            }
        } else if color.enabled() {
            writeln!(w, "{} {} {}{}", label, "✗".red().bold(), title, year)?;
        } else {
            writeln!(w, "{} ✗ {}{}", label, title, year)?;
        }

        if !citation.authors.is_empty() {
            let authors = citation.authors.join("; ");
            if color.enabled() {
                writeln!(w, "    {}", authors.cyan())?;
            } else {
                writeln!(w, "    {}", authors)?;
            }
        }
        if let Some(ref link) = citation.authority_link {
            if color.enabled() {
                writeln!(w, "    {}", link.dimmed())?;
            } else {
                writeln!(w, "    {}", link)?;
            }
        }
        if citation.is_supplementary {
            if color.enabled() {
                writeln!(w, "    {}", "(suggested additional reading)".dimmed())?;
            } else {
                writeln!(w, "    (suggested additional reading)")?;
            }
        }
    }

    let verified = citations.iter().filter(|c| c.verified).count();
    let supplementary = citations.iter().filter(|c| c.is_supplementary).count();
    writeln!(w)?;
    let summary = format!(
        "{} citations, {} verified, {} suggested",
        citations.len(),
        verified,
        supplementary
    );
    if color.enabled() {
        writeln!(w, "{}", summary.dimmed())?;
    } else {
        writeln!(w, "{}", summary)?;
    }
    Ok(())
}

/// Print the raw segmentation result (dry run, no network calls).
pub fn print_segmentation(
    w: &mut dyn Write,
    blocks: &[String],
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w, "Found {} reference blocks", blocks.len())?;
    writeln!(w)?;
    for (i, block) in blocks.iter().enumerate() {
        if color.enabled() {
            writeln!(w, "{} {}", format!("[{}]", i + 1).bold(), block)?;
        } else {
            writeln!(w, "[{}] {}", i + 1, block)?;
        }
    }
    Ok(())
}

/// Print the available persona names with a preview of each prompt.
pub fn print_personas(
    w: &mut dyn Write,
    personas: &[(String, String)],
    color: ColorMode,
) -> std::io::Result<()> {
    for (name, prompt) in personas {
        let preview: String = prompt.chars().take(70).collect();
        let ellipsis = if prompt.chars().count() > 70 { "..." } else { "" };
        if color.enabled() {
            writeln!(w, "{}", name.bold())?;
            writeln!(w, "    {}{}", preview.dimmed(), ellipsis)?;
        } else {
            writeln!(w, "{}", name)?;
            writeln!(w, "    {}{}", preview, ellipsis)?;
        }
    }
    Ok(())
}
