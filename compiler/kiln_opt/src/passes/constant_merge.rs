use kiln_ir::{ModuleRef, Type, Value};
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::pass::{Pass, PassResult, PassScope};

/// Folds internal constant globals with identical initializers into one.
///
/// The first constant global with a given type, initializer and section
/// becomes canonical; later internal duplicates are redirected to it and
/// deleted. The canonical global keeps the larger alignment.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConstantMergePass;

#[derive(PartialEq, Eq, Hash)]
struct Contents<'ctx> {
    ty: Type<'ctx>,
    initializer: Value<'ctx>,
    section: Option<String>,
}

impl Pass for ConstantMergePass {
    fn name(&self) -> &'static str {
        "constmerge"
    }

    fn scope(&self) -> PassScope {
        PassScope::Module
    }

    fn run_on_module(&self, module: ModuleRef<'_>) -> Result<PassResult> {
        let mut canonical: FxHashMap<Contents<'_>, Value<'_>> = FxHashMap::default();
        let mut merged = 0;
        for global in module.globals()? {
            if !global.is_global_constant()? || global.is_thread_local()? {
                continue;
            }
            let Some(initializer) = global.initializer()? else {
                continue;
            };
            let key = Contents {
                ty: global.type_of()?,
                initializer,
                section: global.section()?,
            };
            match canonical.get(&key) {
                Some(&keep) if global.linkage()?.is_local() => {
                    if global.alignment()? > keep.alignment()? {
                        keep.set_alignment(global.alignment()?)?;
                    }
                    global.replace_all_uses_with(keep)?;
                    global.delete_global()?;
                    merged += 1;
                }
                Some(_) => {}
                None => {
                    canonical.insert(key, global);
                }
            }
        }
        Ok(PassResult::changed(merged))
    }
}
