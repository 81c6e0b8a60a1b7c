//! Macro re-entrancy.
//!
//! A receiverless call that names a macro is expanded instead of resolved:
//! the backend renders source text, the parser turns it back into a tree,
//! and the driver types the result in place, at the call's own scope and
//! with the call's locals visible. The call's type is the generated
//! code's type.

use crate::ast::{ExprId, ExprKind};
use crate::collab::MacroExpander;
use crate::error::{InferError, Result};
use crate::inference::program::MacroCacheKey;
use crate::inference::visitor::TypeVisitor;
use std::rc::Rc;
use tracing::debug;

impl TypeVisitor<'_> {
    /// Expand `call` if it names a macro. Returns `false` for ordinary calls.
    pub(crate) fn expand_macro(&mut self, call: ExprId) -> Result<bool> {
        let ExprKind::Call {
            obj: None,
            name,
            args,
            ..
        } = self.program.ast.kind(call).clone()
        else {
            return Ok(false);
        };
        if name == "super" {
            return Ok(false);
        }

        let scope = self.lookup_scope();
        let root = self.program.root();
        let macro_def = self
            .program
            .types
            .lookup_macro(scope, &name, args.len())
            .or_else(|| self.program.types.lookup_macro(root, &name, args.len()));
        let Some(macro_def) = macro_def else {
            return Ok(false);
        };

        if self.program.macro_depth >= self.options.max_macro_depth {
            let message = format!(
                "macro expansion too deep (limit {})",
                self.options.max_macro_depth
            );
            return Err(self.error_at(call, message));
        }

        let expander = self.macro_expander(macro_def, &args);
        let source = expander.expand(self.program, call)?;
        debug!(name = %name, depth = self.program.macro_depth, "expanding macro");

        let locals: Vec<String> = self.ctx.vars.keys().cloned().collect();
        let filename = format!("expanded macro {name}");
        let generated = match self.type_expansion(&source, &filename, &locals) {
            Ok(generated) => generated,
            Err(err) if err.is_internal() => return Err(err),
            Err(err) => return Err(self.error_at(call, expansion_failure(&source, &err))),
        };

        self.program.macro_targets.insert(call, generated);
        let call_node = self.program.node_of(call);
        let generated_node = self.program.node_of(generated);
        self.program.bind(call_node, &[generated_node])?;
        Ok(true)
    }

    /// Expander for `macro_def`, built once per combination of argument shapes
    fn macro_expander(&mut self, macro_def: ExprId, args: &[ExprId]) -> Rc<dyn MacroExpander> {
        let shapes = args
            .iter()
            .map(|arg| self.program.ast.kind(*arg).shape())
            .collect();
        let key = MacroCacheKey { macro_def, shapes };
        if let Some(expander) = self.program.macro_cache.get(&key) {
            debug!(?key, "macro expander cache hit");
            return Rc::clone(expander);
        }
        debug!(?key, "macro expander cache miss");
        let backend = Rc::clone(&self.collab.macros);
        let expander: Rc<dyn MacroExpander> = Rc::from(backend.build(self.program, macro_def));
        self.program.macro_cache.insert(key, Rc::clone(&expander));
        expander
    }

    fn type_expansion(&mut self, source: &str, filename: &str, locals: &[String]) -> Result<ExprId> {
        let parser = Rc::clone(&self.collab.parser);
        let normalizer = Rc::clone(&self.collab.normalizer);
        let parsed = parser.parse(source, filename, locals)?;
        let normalized = normalizer.normalize(self.program, parsed);
        let generated = self.program.lower(normalized)?;

        self.program.macro_depth += 1;
        let result = self.visit(generated);
        self.program.macro_depth -= 1;
        result.map(|()| generated)
    }
}

/// Message for an expansion that failed to parse or type, listing the
/// generated source with line numbers.
fn expansion_failure(source: &str, err: &InferError) -> String {
    let rule = "=".repeat(80);
    let dashes = "-".repeat(80);
    let listing: Vec<String> = source
        .lines()
        .enumerate()
        .map(|(index, line)| format!("{:>3}. {line}", index + 1))
        .collect();
    format!(
        "macro didn't expand to a valid program, it expanded to:\n\n{rule}\n{dashes}\n{}\n{dashes}\n{}{rule}",
        listing.join("\n"),
        err.render(Some(source))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyntaxError;
    use crate::syntax::Location;

    #[test]
    fn test_expansion_failure_listing() {
        let err = InferError::from(SyntaxError::new(
            "unexpected token: end",
            Some(Location::new(Some("expanded macro m"), 2, 3)),
        ));
        let message = expansion_failure("a = 1\n  end", &err);
        insta::assert_snapshot!(message, @r"
        macro didn't expand to a valid program, it expanded to:

        ================================================================================
        --------------------------------------------------------------------------------
          1. a = 1
          2.   end
        --------------------------------------------------------------------------------
        Error in expanded macro m:2:3: unexpected token: end

          end
          ^
        ================================================================================
        ");
    }
}
