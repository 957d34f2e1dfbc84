use log::{debug, info, trace};
use roxmltree::Document;

use super::command::Command;
use super::document::tag_is;
use super::error::{BatchError, Result};
use super::runner::Batch;
use super::symbols::SymbolTable;

const ROOT_TAG: &str = "batch";

/// Turns a parsed document into a [`Batch`].
///
/// File aliases are resolved while building: an `in`/`out` reference must
/// name a `<filename>` that appears earlier in the document.
#[derive(Default)]
pub struct BatchBuilder {
    symbols: SymbolTable,
}

impl BatchBuilder {
    pub fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
        }
    }

    pub fn build(mut self, doc: &Document) -> Result<Batch> {
        info!("Building Batch...");
        let root = doc.root_element();
        if !tag_is(root, ROOT_TAG) {
            return Err(BatchError::Validation(root.tag_name().name().to_string()));
        }

        let mut batch = Batch::new();
        // 只处理元素节点，忽略文本与注释
        for node in root.children().filter(|n| n.is_element()) {
            let cmd = Command::parse(node, &mut self.symbols)?;
            batch.add(Some(cmd))?;
        }
        batch.mark_built();

        if self.symbols.is_empty() {
            debug!("文档中没有文件别名");
        }
        for (id, path) in self.symbols.iter() {
            trace!("别名 {} -> {}", id, path.display());
        }

        debug!(
            "构建完成: {} 条命令, {} 个文件别名",
            batch.len(),
            self.symbols.len()
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::runner::{BatchState, FailurePolicy};
    use std::fs;
    use std::path::PathBuf;

    fn build(xml: &str) -> Result<Batch> {
        let doc = Document::parse(xml).map_err(|e| BatchError::malformed("test", e.to_string()))?;
        BatchBuilder::new().build(&doc)
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_order_skips_non_elements() {
        let batch = build(
            r#"<?xml version="1.0"?>
            <BATCH>
                some text
                <filename id="a" path="/tmp/a.txt"/>
                <!-- comment -->
                <pipecmd><exec path="ls"/><exec path="wc"/></pipecmd>
                <exec path="echo" args="done"/>
            </BATCH>"#,
        )
        .unwrap();
        let kinds: Vec<&str> = batch.commands().iter().map(Command::kind).collect();
        assert_eq!(kinds, vec!["filename", "pipecmd", "exec"]);
        assert_eq!(batch.state(), BatchState::Built);
    }

    #[test]
    fn test_root_must_be_batch() {
        let result = build(r#"<notabatch><exec path="echo"/></notabatch>"#);
        assert!(matches!(result, Err(BatchError::Validation(tag)) if tag == "notabatch"));
    }

    #[test]
    fn test_unknown_command_kind() {
        let result = build(r#"<batch><exec path="true"/><launch path="x"/></batch>"#);
        assert!(matches!(result, Err(BatchError::UnknownCommandKind(tag)) if tag == "launch"));
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_alias_resolved_from_earlier_filename() {
        let batch = build(
            r#"<batch>
                <filename id="f1" path="/tmp/first.txt"/>
                <exec path="cat" in="f1"/>
                <filename id="f1" path="/tmp/second.txt"/>
                <exec path="cat" in="f1"/>
            </batch>"#,
        )
        .unwrap();
        let inputs: Vec<Option<PathBuf>> = batch
            .commands()
            .iter()
            .filter_map(|cmd| match cmd {
                Command::Exec(exec) => Some(exec.redirect.input.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            inputs,
            vec![
                Some(PathBuf::from("/tmp/first.txt")),
                Some(PathBuf::from("/tmp/second.txt"))
            ]
        );
    }

    #[test]
    fn test_alias_defined_later_is_unknown() {
        let result = build(
            r#"<batch>
                <exec path="cat" out="f1"/>
                <filename id="f1" path="/tmp/out.txt"/>
            </batch>"#,
        );
        assert!(matches!(result, Err(BatchError::UnknownAlias(id)) if id == "f1"));
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_dotted_alias_defined_later_is_a_literal_path() {
        let batch = build(
            r#"<batch>
                <exec path="cat" out="f.1"/>
                <filename id="f.1" path="/tmp/out.txt"/>
            </batch>"#,
        )
        .unwrap();
        match &batch.commands()[0] {
            Command::Exec(exec) => assert_eq!(exec.redirect.output, Some(PathBuf::from("f.1"))),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_echo_into_alias_end_to_end() {
        let out = std::env::temp_dir().join(format!("batchproc_e2e_{}.txt", std::process::id()));
        let xml = format!(
            r#"<batch>
                <filename id="f1" path="{}"/>
                <exec path="echo" args="hi" out="f1"/>
            </batch>"#,
            out.display()
        );
        let mut batch = build(&xml).unwrap();
        assert_eq!(batch.len(), 2);

        let mut trace = Vec::new();
        let report = batch.execute(FailurePolicy::Continue, &mut trace).unwrap();
        let trace = String::from_utf8(trace).unwrap();
        assert_eq!(trace.lines().count(), 2);
        assert_eq!(report.failures().count(), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "hi\n");
        let _ = fs::remove_file(out);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_pipecmd_end_to_end() {
        let out = std::env::temp_dir().join(format!("batchproc_e2e_pipe_{}.txt", std::process::id()));
        let xml = format!(
            r#"<batch>
                <pipecmd>
                    <exec path="printf" args="%s abc"/>
                    <exec path="wc" args="-c" out="{}"/>
                </pipecmd>
            </batch>"#,
            out.display()
        );
        let mut batch = build(&xml).unwrap();
        batch.execute(FailurePolicy::Continue, &mut Vec::new()).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "3");
        let _ = fs::remove_file(out);
    }
}
