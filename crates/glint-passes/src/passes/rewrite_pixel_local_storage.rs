//! Lowers pixel local storage to image load/store
//!
//! Backends without native pixel local storage get the portable lowering:
//! every pixel-local handle declaration becomes an `image2D` binding, loads
//! become `imageLoad` at the current fragment coordinate, and stores become
//! `imageStore`. The image memory is not coherent across the pass, so an
//! image memory barrier is inserted before every statement that loads.
//! Binding-slot assignment happens in the backend, not here.

use crate::error::PassError;
use crate::passes::{PassResult, RewritePass};
use crate::traverse::{AstVisitor, Traversal, Visit};
use glint_ast::{
    builtin_call, constructor, swizzle, symbol, Ast, BasicType, BuiltinOp, CompileContext,
    NodeId, NodeKind, Precision, Type,
};

fn image_type(handle_ty: Type) -> Type {
    Type {
        basic: BasicType::Image2D,
        ..handle_ty
    }
}

/// `ivec2(gl_FragCoord.xy)`
fn fragment_coord(ast: &mut Ast) -> NodeId {
    let frag_coord = symbol(
        ast,
        "gl_FragCoord",
        Type::vector(BasicType::Float, Precision::High, 4),
    );
    let xy = swizzle(ast, frag_coord, vec![0, 1]);
    let ivec2 = Type::vector(BasicType::Int, Precision::High, 2);
    constructor(ast, ivec2, vec![xy])
}

struct PixelLocalVisitor {
    replaced: bool,
}

impl AstVisitor for PixelLocalVisitor {
    fn visit_declaration(
        &mut self,
        t: &mut Traversal,
        ast: &mut Ast,
        node: NodeId,
        visit: Visit,
    ) -> bool {
        if visit != Visit::Pre {
            return true;
        }
        if ast.node(node).ty.basic != BasicType::PixelLocal {
            return true;
        }
        let NodeKind::Declaration { name, initializer } = ast.node(node).kind.clone() else {
            unreachable!("declaration hook on non-declaration node");
        };
        debug_assert!(initializer.is_none());
        let handle_ty = ast.node(node).ty;
        let image_decl = glint_ast::declaration(ast, name, image_type(handle_ty), None);
        t.queue_replacement(node, image_decl);
        self.replaced = true;
        false
    }

    fn visit_call(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        if visit != Visit::Pre {
            return true;
        }
        let NodeKind::Call { target, args } = ast.node(node).kind.clone() else {
            unreachable!("call hook on non-call node");
        };
        let op = match target.as_builtin() {
            Some(op @ (BuiltinOp::PixelLocalLoad | BuiltinOp::PixelLocalStore)) => op,
            _ => return true,
        };

        let handle = args[0];
        let NodeKind::Symbol { name } = ast.node(handle).kind.clone() else {
            unreachable!("pixel local operand is always a plain handle");
        };
        let handle_ty = ast.node(handle).ty;
        let image = symbol(ast, name, image_type(handle_ty));
        let coord = fragment_coord(ast);

        let replacement = match op {
            BuiltinOp::PixelLocalLoad => {
                // Make earlier stores visible before reading
                let barrier =
                    builtin_call(ast, BuiltinOp::MemoryBarrierImage, vec![], Type::void());
                t.insert_statements_in_parent_block(ast, vec![barrier], vec![]);
                let return_ty = ast.node(node).ty;
                builtin_call(ast, BuiltinOp::ImageLoad, vec![image, coord], return_ty)
            }
            BuiltinOp::PixelLocalStore => {
                let value = args[1];
                builtin_call(
                    ast,
                    BuiltinOp::ImageStore,
                    vec![image, coord, value],
                    Type::void(),
                )
            }
            _ => unreachable!(),
        };
        t.queue_replacement(node, replacement);
        self.replaced = true;
        // The value operand survives inside the replacement; anything left
        // in it is picked up on the next iteration
        false
    }
}

/// Lower every pixel-local handle, load and store in the program
pub fn rewrite_pixel_local_storage(
    ast: &mut Ast,
    root: NodeId,
    _ctx: &mut CompileContext,
) -> Result<PassResult, PassError> {
    let mut modified = false;
    loop {
        let mut visitor = PixelLocalVisitor { replaced: false };
        let mut traversal = Traversal::new();
        traversal.traverse(&mut visitor, ast, root);
        traversal.update_tree(ast)?;
        if !visitor.replaced {
            break;
        }
        modified = true;
    }
    Ok(PassResult {
        modified,
        functions_changed: false,
    })
}

#[derive(Debug, Default)]
pub struct RewritePixelLocalStorage;

impl RewritePass for RewritePixelLocalStorage {
    fn name(&self) -> &'static str {
        "rewrite-pixel-local-storage"
    }

    fn run(
        &mut self,
        ast: &mut Ast,
        root: NodeId,
        ctx: &mut CompileContext,
    ) -> Result<PassResult, PassError> {
        rewrite_pixel_local_storage(ast, root, ctx)
    }
}
