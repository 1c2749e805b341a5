use colored::Colorize;
use retriever::replace::{DiffHunk, FileDiff};
use similar::{ChangeTag, TextDiff};

/// Prints the hunks of a replace preview. Line pairs of equal-sized hunks get their
/// changed words highlighted.
pub fn print_file_diff(diff: &FileDiff) {
    println!("\n--- {}", diff.path.display().to_string().blue());
    println!("+++ {}", diff.path.display().to_string().blue());

    for hunk in &diff.hunks {
        println!(
            "{}",
            format!(
                "@@ -{},{} +{},{} @@",
                hunk.original_start_line,
                hunk.original_lines.len(),
                hunk.new_start_line,
                hunk.new_lines.len()
            )
            .cyan()
        );
        if hunk.original_lines.len() == hunk.new_lines.len() {
            for (old, new) in hunk.original_lines.iter().zip(&hunk.new_lines) {
                let (old_line, new_line) = highlight_words(old, new);
                println!("{}{}", "-".red(), old_line);
                println!("{}{}", "+".green(), new_line);
            }
        } else {
            print_plain(hunk);
        }
    }
}

fn print_plain(hunk: &DiffHunk) {
    for line in &hunk.original_lines {
        println!("{}", format!("-{}", line).red());
    }
    for line in &hunk.new_lines {
        println!("{}", format!("+{}", line).green());
    }
}

/// Both sides of a changed line with the differing words colored
fn highlight_words(old: &str, new: &str) -> (String, String) {
    let diff = TextDiff::from_words(old, new);
    let (mut old_line, mut new_line) = (String::new(), String::new());
    for change in diff.iter_all_changes() {
        let value = change.value();
        match change.tag() {
            ChangeTag::Equal => {
                old_line.push_str(value);
                new_line.push_str(value);
            }
            ChangeTag::Delete => old_line.push_str(&value.red().bold().to_string()),
            ChangeTag::Insert => new_line.push_str(&value.green().bold().to_string()),
        }
    }
    (old_line, new_line)
}
